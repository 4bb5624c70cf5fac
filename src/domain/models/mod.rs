// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了采集流水线触及的业务实体，包括：
/// - 列表页（list_page）与候选文章（article）
/// - 公告（announcement）及其附件
/// - 职位（position）与原始解析记录
/// - 抓取任务（task）与任务日志（crawl_log）
/// - 通知（notification）与提醒来源（reminder）
/// - LLM 配置池（llm_config）
pub mod announcement;
pub mod article;
pub mod crawl_log;
pub mod list_page;
pub mod llm_config;
pub mod notification;
pub mod position;
pub mod reminder;
pub mod task;
