// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 搜索索引领域模块
///
/// 定义职位文档与索引推送接口，具体实现位于基础设施层。
pub mod index;
