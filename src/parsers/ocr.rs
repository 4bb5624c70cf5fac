// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ParseError;
use crate::config::settings::OcrSettings;

/// OCR 识别出的文字区域
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrBox {
    pub text: String,
    #[serde(default)]
    pub page: u32,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// 0-100
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct OcrResult {
    pub text: String,
    pub boxes: Vec<OcrBox>,
}

/// OCR 引擎
///
/// 取消令牌触发时必须尽快返回 [`ParseError::Cancelled`]，并回收子进程或连接。
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// 识别单张图片
    async fn recognize_image(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<OcrResult, ParseError>;

    /// 识别扫描版 PDF 的全部页面
    async fn recognize_pdf(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<OcrResult, ParseError>;
}

/// 按配置创建 OCR 引擎；`none` 表示不启用
pub fn build_ocr_engine(settings: &OcrSettings) -> Result<Option<Arc<dyn OcrEngine>>, ParseError> {
    let timeout = Duration::from_secs(settings.timeout.max(1));
    let engine: Arc<dyn OcrEngine> = match settings.engine.trim().to_ascii_lowercase().as_str() {
        "" | "none" | "disabled" => return Ok(None),
        "tesseract" => Arc::new(TesseractEngine {
            tesseract_cmd: settings.tesseract_cmd.clone(),
            pdftoppm_cmd: settings.pdftoppm_cmd.clone(),
            language: settings.language.clone(),
            timeout,
        }),
        "api" | "http" => {
            let url = settings
                .api_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| ParseError::Config("OCR API 引擎需要 ocr.api_url".to_string()))?;
            Arc::new(HttpOcrEngine::new(url, settings.api_key.clone(), timeout)?)
        }
        other => return Err(ParseError::Config(format!("未知的 OCR 引擎: {}", other))),
    };
    info!(engine = engine.name(), "OCR 引擎已初始化");
    Ok(Some(engine))
}

/// 调用本地 tesseract 命令行
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    tesseract_cmd: String,
    pdftoppm_cmd: String,
    language: String,
    timeout: Duration,
}

impl TesseractEngine {
    async fn run(
        &self,
        program: &str,
        mut command: Command,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ParseError> {
        command
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = command
            .spawn()
            .map_err(|e| ParseError::Ocr(format!("启动 {} 失败: {}", program, e)))?;

        // 取消或超时都会丢弃 future，kill_on_drop 负责结束子进程
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ParseError::Cancelled),
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Err(_) => Err(ParseError::Timeout),
                Ok(Err(e)) => Err(ParseError::Io(e)),
                Ok(Ok(output)) if output.status.success() => Ok(output.stdout),
                Ok(Ok(output)) => Err(ParseError::Ocr(format!(
                    "{} 退出码 {:?}: {}",
                    program,
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ))),
            }
        }
    }

    async fn recognize_file(
        &self,
        path: &Path,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<OcrResult, ParseError> {
        let mut command = Command::new(&self.tesseract_cmd);
        command
            .arg(path)
            .arg("stdout")
            .args(["-l", &self.language, "--psm", "6", "tsv"]);
        let stdout = self.run(&self.tesseract_cmd, command, cancel).await?;
        Ok(parse_tsv(&String::from_utf8_lossy(&stdout), page))
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize_image(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<OcrResult, ParseError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("image");
        tokio::fs::write(&path, bytes).await?;
        self.recognize_file(&path, 1, cancel).await
    }

    async fn recognize_pdf(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<OcrResult, ParseError> {
        let dir = tempfile::tempdir()?;
        let pdf_path = dir.path().join("document.pdf");
        tokio::fs::write(&pdf_path, bytes).await?;

        let mut command = Command::new(&self.pdftoppm_cmd);
        command
            .args(["-r", "300", "-png"])
            .arg(&pdf_path)
            .arg(dir.path().join("page"));
        self.run(&self.pdftoppm_cmd, command, cancel).await?;

        let pages = rendered_pages(dir.path()).await?;
        debug!(pages = pages.len(), "PDF 已渲染为图片");

        let mut merged = OcrResult::default();
        for (index, page) in pages.iter().enumerate() {
            let result = self.recognize_file(page, index as u32 + 1, cancel).await?;
            if !merged.text.is_empty() {
                merged.text.push('\n');
            }
            merged.text.push_str(&result.text);
            merged.boxes.extend(result.boxes);
        }
        Ok(merged)
    }
}

/// pdftoppm 输出的 page-1.png、page-01.png 等，按页码排序
async fn rendered_pages(dir: &Path) -> Result<Vec<PathBuf>, ParseError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(number) = name
            .strip_prefix("page-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        pages.push((number, entry.path()));
    }
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

/// 解析 tesseract TSV 输出
///
/// 列依次为 level page_num block_num par_num line_num word_num left top width height conf text，
/// 只取单词级（level 5）且文本非空的行；同一 (block, par, line) 的单词拼成一行。
pub fn parse_tsv(tsv: &str, page: u32) -> OcrResult {
    let mut result = OcrResult::default();
    let mut current_line: Option<(u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        let confidence = cols[10].trim().parse::<f32>().unwrap_or(-1.0);
        if word.is_empty() || confidence < 0.0 {
            continue;
        }

        let number = |i: usize| cols[i].trim().parse::<i64>().unwrap_or(0);
        let line_key = (number(2) as u32, number(3) as u32, number(4) as u32);
        if current_line != Some(line_key) {
            if current_line.is_some() {
                result.text.push('\n');
            }
            current_line = Some(line_key);
        } else if needs_space(&result.text, word) {
            result.text.push(' ');
        }
        result.text.push_str(word);

        result.boxes.push(OcrBox {
            text: word.to_string(),
            page,
            x: number(6) as i32,
            y: number(7) as i32,
            width: number(8) as i32,
            height: number(9) as i32,
            confidence,
        });
    }
    result
}

/// 中文之间不加空格，其它情况按单词分隔
fn needs_space(previous: &str, next: &str) -> bool {
    match (previous.chars().last(), next.chars().next()) {
        (Some(a), Some(b)) => a.is_ascii() || b.is_ascii(),
        _ => false,
    }
}

/// 远程 OCR 服务
///
/// 以 `application/octet-stream` 上传原始字节，返回 `{text, error, boxes}`。
#[derive(Debug, Clone)]
pub struct HttpOcrEngine {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OcrApiResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    boxes: Vec<OcrBox>,
}

impl HttpOcrEngine {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, ParseError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParseError::Config(format!("OCR HTTP 客户端创建失败: {}", e)))?;
        Ok(Self {
            client,
            url,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    async fn post(
        &self,
        bytes: &[u8],
        document_type: &str,
        cancel: &CancellationToken,
    ) -> Result<OcrResult, ParseError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header("X-Document-Type", document_type)
            .body(bytes.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ParseError::Cancelled),
            response = request.send() => response.map_err(|e| {
                if e.is_timeout() {
                    ParseError::Timeout
                } else {
                    ParseError::Ocr(format!("OCR 服务请求失败: {}", e))
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "OCR 服务返回错误状态");
            return Err(ParseError::Ocr(format!("OCR 服务状态 {}: {}", status, body.trim())));
        }

        let body: OcrApiResponse = response
            .json()
            .await
            .map_err(|e| ParseError::Ocr(format!("OCR 响应无法解析: {}", e)))?;
        if let Some(error) = body.error.filter(|e| !e.trim().is_empty()) {
            return Err(ParseError::Ocr(error));
        }
        Ok(OcrResult {
            text: body.text,
            boxes: body.boxes,
        })
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn recognize_image(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<OcrResult, ParseError> {
        self.post(bytes, "image", cancel).await
    }

    async fn recognize_pdf(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<OcrResult, ParseError> {
        self.post(bytes, "pdf", cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ocr_settings(engine: &str) -> OcrSettings {
        OcrSettings {
            engine: engine.to_string(),
            language: "chi_sim+eng".to_string(),
            tesseract_cmd: "gwycrawl-missing-tesseract".to_string(),
            pdftoppm_cmd: "gwycrawl-missing-pdftoppm".to_string(),
            api_url: None,
            api_key: None,
            timeout: 5,
        }
    }

    #[test]
    fn test_parse_tsv_groups_lines() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
            1\t1\t0\t0\t0\t0\t0\t0\t1000\t1000\t-1\t\n\
            5\t1\t1\t1\t1\t1\t10\t20\t60\t18\t91.5\t职位名称\n\
            5\t1\t1\t1\t1\t2\t80\t20\t40\t18\t88\t科员\n\
            5\t1\t1\t1\t2\t1\t10\t50\t30\t18\t90\t招录\n\
            5\t1\t1\t1\t2\t2\t50\t50\t10\t18\t95\t2\n";

        let result = parse_tsv(tsv, 3);

        assert_eq!(result.text, "职位名称科员\n招录 2");
        assert_eq!(result.boxes.len(), 4);
        assert_eq!(result.boxes[0].page, 3);
        assert_eq!(result.boxes[1].x, 80);
        assert!((result.boxes[0].confidence - 91.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_build_engine_by_name() {
        assert!(build_ocr_engine(&ocr_settings("none")).unwrap().is_none());
        assert_eq!(
            build_ocr_engine(&ocr_settings("tesseract")).unwrap().unwrap().name(),
            "tesseract"
        );
        assert!(matches!(
            build_ocr_engine(&ocr_settings("api")),
            Err(ParseError::Config(_))
        ));
        assert!(matches!(
            build_ocr_engine(&ocr_settings("paddle")),
            Err(ParseError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_tesseract_binary_is_ocr_error() {
        let engine = build_ocr_engine(&ocr_settings("tesseract")).unwrap().unwrap();
        let result = engine
            .recognize_image(b"\x89PNG", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ParseError::Ocr(_))));
    }

    #[tokio::test]
    async fn test_http_engine_sends_bearer_key() {
        // Given: OCR 服务要求 Bearer 密钥
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ocr"))
            .and(header("authorization", "Bearer secret"))
            .and(header("content-type", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "职位名称：科员",
                "boxes": [{"text": "科员", "x": 1, "y": 2, "width": 3, "height": 4}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = ocr_settings("api");
        settings.api_url = Some(format!("{}/ocr", server.uri()));
        settings.api_key = Some("secret".to_string());
        let engine = build_ocr_engine(&settings).unwrap().unwrap();

        // When
        let result = engine
            .recognize_image(b"image-bytes", &CancellationToken::new())
            .await
            .unwrap();

        // Then
        assert_eq!(result.text, "职位名称：科员");
        assert_eq!(result.boxes[0].height, 4);
    }

    #[tokio::test]
    async fn test_http_engine_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": "", "error": "unsupported image"})),
            )
            .mount(&server)
            .await;

        let engine = HttpOcrEngine::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        let result = engine.recognize_pdf(b"%PDF", &CancellationToken::new()).await;
        assert!(matches!(result, Err(ParseError::Ocr(msg)) if msg == "unsupported image"));
    }

    #[tokio::test]
    async fn test_http_engine_honors_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let engine = HttpOcrEngine::new(server.uri(), None, Duration::from_secs(30)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine.recognize_image(b"x", &cancel).await;
        assert!(matches!(result, Err(ParseError::Cancelled)));
    }
}
