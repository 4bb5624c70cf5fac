// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 声明一个惰性编译的静态正则
///
/// 编译失败时得到 `None`，调用方按"无匹配"处理；
/// 每个模式都有对应的单元测试保证可编译。
macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        static $name: once_cell::sync::Lazy<Option<regex::Regex>> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pattern).ok());
    };
}

/// 声明一个惰性解析的静态 CSS 选择器，语义同 `static_regex!`
macro_rules! static_selector {
    ($name:ident, $css:expr) => {
        static $name: once_cell::sync::Lazy<Option<scraper::Selector>> =
            once_cell::sync::Lazy::new(|| scraper::Selector::parse($css).ok());
    };
}

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
/// 包括错误类型、重试策略、加解密、编码探测与遥测
pub mod crypto;
pub mod dates;
pub mod errors;
pub mod retry_policy;
pub mod telemetry;
pub mod text_encoding;
pub mod url_utils;
