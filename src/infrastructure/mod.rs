// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 领域层抽象接口的具体实现：
/// - 数据库（database）：连接池、迁移与实体映射
/// - 指标（metrics）：Prometheus 指标注册
/// - 通知渠道（notifications）：推送、邮件、短信
/// - 仓库实现（repositories）：基于 SeaORM 的仓库
/// - 搜索索引（search）：职位文档写入外部索引
/// - 外部数据源（sources）：粉笔、微信公众号
pub mod database;
pub mod metrics;
pub mod notifications;
pub mod repositories;
pub mod search;
pub mod sources;
