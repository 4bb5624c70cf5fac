// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 文档解析模块
///
/// 所有解析器共享同一契约：字节输入，输出 (正文, 职位记录, 置信度)。
/// - HTML 表格（html_table）
/// - Word（docx）
/// - Excel（excel）
/// - PDF 文本层（pdf）
/// - OCR（ocr）
/// - 段落字段正则提取（text_fields）
pub mod docx;
pub mod excel;
pub mod field_mapping;
pub mod html_table;
pub mod ocr;
pub mod pdf;
pub mod text_fields;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::settings::ParserSettings;
use crate::domain::models::position::ParsedPosition;
use crate::utils::errors::PipelineError;
use ocr::{OcrBox, OcrEngine};

/// 表格类解析结果的默认置信度
pub const TABLE_CONFIDENCE: i32 = 85;
/// 段落正则提取的置信度
pub const TEXT_FIELD_CONFIDENCE: i32 = 70;

/// 解析错误类型
#[derive(Error, Debug)]
pub enum ParseError {
    /// 文档结构损坏或无法识别
    #[error("文档格式错误: {0}")]
    Malformed(String),

    #[error("不支持的文档类型: {0}")]
    Unsupported(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// OCR 引擎调用失败
    #[error("OCR失败: {0}")]
    Ocr(String),

    /// 配置缺失或无效，例如未知的 OCR 引擎
    #[error("解析配置错误: {0}")]
    Config(String),

    #[error("解析超时")]
    Timeout,

    #[error("解析已取消")]
    Cancelled,
}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Cancelled => PipelineError::Cancelled,
            ParseError::Timeout | ParseError::Ocr(_) | ParseError::Io(_) => {
                PipelineError::Transient(err.to_string())
            }
            ParseError::Config(_) => PipelineError::Permanent(err.to_string()),
            ParseError::Malformed(_) | ParseError::Unsupported(_) => {
                PipelineError::Validation(err.to_string())
            }
        }
    }
}

/// 解析输出
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    /// 抽取出的纯文本
    pub text: String,
    pub positions: Vec<ParsedPosition>,
    /// 0-100；没有职位时为 0
    pub confidence: i32,
    /// PDF 无文本层，正文来自 OCR
    pub scanned: bool,
    /// OCR 区域框，仅 OCR 路径填充
    pub boxes: Vec<OcrBox>,
}

impl ParseOutput {
    pub fn from_positions(text: String, positions: Vec<ParsedPosition>, confidence: i32) -> Self {
        let confidence = if positions.is_empty() { 0 } else { confidence };
        Self {
            text,
            positions,
            confidence,
            scanned: false,
            boxes: Vec::new(),
        }
    }

    pub fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }
}

/// 文档种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    Docx,
    /// 旧版 Word 二进制
    Doc,
    Xlsx,
    /// 旧版 Excel 二进制
    Xls,
    Pdf,
    Image,
    Unknown,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

impl DocumentKind {
    /// 根据文件头、文件名与 Content-Type 判断文档种类
    ///
    /// 文件头优先；ZIP 与 OLE 容器再借助名称区分 Word 与 Excel。
    pub fn detect(bytes: &[u8], name: &str, content_type: Option<&str>) -> Self {
        let lower = name.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or_default();
        let ext = path.rsplit('.').next().unwrap_or_default();
        let ct = content_type.unwrap_or_default().to_ascii_lowercase();

        if bytes.starts_with(b"%PDF") {
            return DocumentKind::Pdf;
        }
        if bytes.starts_with(PNG_MAGIC) || bytes.starts_with(JPEG_MAGIC) {
            return DocumentKind::Image;
        }
        if bytes.starts_with(ZIP_MAGIC) {
            if ext == "xlsx" || ct.contains("spreadsheetml") || zip_has_entry(bytes, "xl/workbook.xml") {
                return DocumentKind::Xlsx;
            }
            return DocumentKind::Docx;
        }
        if bytes.starts_with(OLE_MAGIC) {
            if matches!(ext, "xls" | "et") || ct.contains("ms-excel") {
                return DocumentKind::Xls;
            }
            return DocumentKind::Doc;
        }
        if looks_like_html(bytes) {
            return DocumentKind::Html;
        }

        match ext {
            "pdf" => DocumentKind::Pdf,
            "docx" => DocumentKind::Docx,
            "doc" | "wps" => DocumentKind::Doc,
            "xlsx" => DocumentKind::Xlsx,
            "xls" | "et" => DocumentKind::Xls,
            "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" => DocumentKind::Image,
            "html" | "htm" | "shtml" => DocumentKind::Html,
            _ if ct.starts_with("text/html") => DocumentKind::Html,
            _ if ct.starts_with("image/") => DocumentKind::Image,
            _ => DocumentKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Html => "html",
            DocumentKind::Docx => "docx",
            DocumentKind::Doc => "doc",
            DocumentKind::Xlsx => "xlsx",
            DocumentKind::Xls => "xls",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
            DocumentKind::Unknown => "unknown",
        }
    }
}

/// 伪装成 Excel/Word 的 HTML 导出文件
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let head_len = bytes.len().min(1024);
    let head = String::from_utf8_lossy(&bytes[..head_len]).to_ascii_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.contains("<html")
        || head.contains("<!doctype html")
        || head.contains("<table")
        || head.contains("<head")
}

fn zip_has_entry(bytes: &[u8], entry: &str) -> bool {
    zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map(|archive| archive.file_names().any(|n| n == entry))
        .unwrap_or(false)
}

/// 按文档种类分派的解析门面
///
/// 持有表头关键词与可选的 OCR 引擎；整个解析受 `timeout` 约束，
/// 并在阶段之间检查取消。
pub struct DocumentParser {
    keywords: Vec<String>,
    ocr: Option<Arc<dyn OcrEngine>>,
    timeout: Duration,
}

impl DocumentParser {
    pub fn new(settings: &ParserSettings, ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self {
            keywords: settings.html.keywords.clone(),
            ocr,
            timeout: Duration::from_secs(settings.document_timeout),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn html_tables(&self) -> html_table::HtmlTableParser {
        html_table::HtmlTableParser::new(self.keywords.clone())
    }

    /// 解析一个文档
    ///
    /// # 参数
    ///
    /// * `bytes` - 文档内容
    /// * `name` - 文件名或 URL，用于辅助判断种类
    /// * `content_type` - 响应头中的 Content-Type
    /// * `cancel` - 取消令牌
    pub async fn parse(
        &self,
        bytes: &[u8],
        name: &str,
        content_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ParseOutput, ParseError> {
        let kind = DocumentKind::detect(bytes, name, content_type);
        debug!(kind = kind.as_str(), name, size = bytes.len(), "开始解析文档");

        let work = self.parse_kind(kind, bytes, cancel);
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ParseError::Cancelled),
            result = tokio::time::timeout(self.timeout, work) => {
                result.map_err(|_| ParseError::Timeout)??
            }
        };

        info!(
            kind = kind.as_str(),
            name,
            positions = output.positions.len(),
            confidence = output.confidence,
            scanned = output.scanned,
            "文档解析完成"
        );
        Ok(output)
    }

    async fn parse_kind(
        &self,
        kind: DocumentKind,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ParseOutput, ParseError> {
        match kind {
            DocumentKind::Html => {
                let html = crate::utils::text_encoding::decode_html(bytes, None);
                Ok(self.html_tables().parse(&html))
            }
            DocumentKind::Docx => docx::parse_docx(bytes, &self.keywords),
            DocumentKind::Doc => docx::parse_legacy_doc(bytes, &self.keywords),
            DocumentKind::Xlsx | DocumentKind::Xls => {
                excel::parse_workbook(bytes, kind, &self.keywords)
            }
            DocumentKind::Pdf => {
                let extracted = pdf::extract_text(bytes)?;
                if !pdf::is_scanned(&extracted) {
                    return Ok(text_fields::parse_text(&extracted, &self.keywords));
                }
                if cancel.is_cancelled() {
                    return Err(ParseError::Cancelled);
                }
                let Some(engine) = &self.ocr else {
                    warn!("扫描版 PDF 且未配置 OCR，仅返回文本层");
                    let mut output = ParseOutput::from_positions(extracted, Vec::new(), 0);
                    output.scanned = true;
                    return Ok(output);
                };
                let recognized = engine.recognize_pdf(bytes, cancel).await?;
                let mut output = text_fields::parse_text(&recognized.text, &self.keywords);
                output.scanned = true;
                output.boxes = recognized.boxes;
                Ok(output)
            }
            DocumentKind::Image => {
                let engine = self
                    .ocr
                    .as_ref()
                    .ok_or_else(|| ParseError::Config("图片附件需要 OCR 引擎".to_string()))?;
                let recognized = engine.recognize_image(bytes, cancel).await?;
                let mut output = text_fields::parse_text(&recognized.text, &self.keywords);
                output.scanned = true;
                output.boxes = recognized.boxes;
                Ok(output)
            }
            DocumentKind::Unknown => Err(ParseError::Unsupported("无法识别的文档".to_string())),
        }
    }
}
