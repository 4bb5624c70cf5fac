// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 数据库实体模块
///
/// 定义数据库表对应的实体结构，使用SeaORM框架进行对象关系映射。
/// 枚举字段以字符串存储，列表字段以 JSON 存储，由仓库实现负责与领域模型互转。
pub mod announcement;
pub mod announcement_attachment;
pub mod announcement_position;
pub mod article;
pub mod calendar_event;
pub mod crawl_log;
pub mod crawl_task;
pub mod list_page;
pub mod llm_config;
pub mod notification;
pub mod notification_delivery;
pub mod position;
pub mod position_favorite;
pub mod subscription;
pub mod user_contact;
