// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 抓取引擎模块
///
/// - 抓取器特质与请求/响应类型（traits）
/// - 每主机令牌桶与并发信号量（host_limiter）
/// - 基于 reqwest 的礼貌抓取器（polite_fetcher）
pub mod host_limiter;
pub mod polite_fetcher;
pub mod traits;

pub use polite_fetcher::PoliteFetcher;
pub use traits::{FetchError, FetchRequest, FetchResponse, Fetcher};
