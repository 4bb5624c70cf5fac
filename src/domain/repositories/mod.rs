// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，遵循依赖倒置原则。
/// 具体实现由基础设施层基于 SeaORM 提供，测试中同一实现跑在内存 SQLite 上。
///
/// 包含的仓库接口：
/// - 公告仓库（announcement_repository）：公告与附件
/// - 文章仓库（article_repository）：列表页发现的候选文章
/// - 任务日志仓库（crawl_log_repository）
/// - 列表页仓库（list_page_repository）
/// - LLM 配置仓库（llm_config_repository）
/// - 通知仓库（notification_repository）
/// - 职位仓库（position_repository）：只由职位归并器写入
/// - 提醒来源仓库（reminder_repository）：日历、收藏、订阅与联系方式
/// - 任务仓库（task_repository）：`crawl_tasks` 记录
pub mod announcement_repository;
pub mod article_repository;
pub mod crawl_log_repository;
pub mod list_page_repository;
pub mod llm_config_repository;
pub mod notification_repository;
pub mod position_repository;
pub mod reminder_repository;
pub mod task_repository;

pub use crate::utils::errors::RepositoryError;
