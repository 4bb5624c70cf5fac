// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工具模块
///
/// 通用工具函数、错误类型与静态正则宏，需先于其他模块声明
#[macro_use]
pub mod utils;

/// 配置模块
///
/// 分层加载默认值、配置文件与环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 礼貌抓取器：每主机限速、重试与体积上限
pub mod engines;

/// 基础设施模块
///
/// 数据库、通知渠道、搜索索引与外部数据源
pub mod infrastructure;

/// 文档解析模块
///
/// HTML 表格、DOCX、XLSX、PDF 与 OCR
pub mod parsers;

/// 表示层模块
///
/// 运维用的 HTTP 接口
pub mod presentation;

/// 队列模块
///
/// 任务 Broker、调度与周期任务
pub mod queue;

/// 工作器模块
///
/// 各任务类型的处理器与工作器管理
pub mod workers;

#[cfg(test)]
mod test_support;
