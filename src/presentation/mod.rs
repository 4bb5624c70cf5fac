// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 运维接口：健康检查、指标与队列状态
pub mod errors;
pub mod handlers;
pub mod routes;
