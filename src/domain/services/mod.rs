// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 列表解析（list_parser）与列表页发现（list_discovery）
/// - LLM 门面（llm_service）、提示词（prompts）、JSON 修复（json_repair）与配置池（llm_config_service）
/// - 正文清洗（heuristic_cleaner、content_cleaner）
/// - 职位提取（position_extractor）与规范化（position_normalizer）
/// - 职位归并（reconciler）
/// - 提醒调度（reminder_service）
///
/// 服务只依赖仓库接口与领域模型，具体实现由基础设施层注入。
pub mod content_cleaner;
pub mod heuristic_cleaner;
pub mod json_repair;
pub mod list_discovery;
pub mod list_parser;
pub mod llm_config_service;
pub mod llm_service;
pub mod position_extractor;
pub mod position_normalizer;
pub mod prompts;
pub mod reconciler;
pub mod reminder_service;
