// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;

/// 固定的系统消息：只输出 JSON
pub const SYSTEM_PROMPT: &str =
    "你是公务员招录信息的结构化提取助手。只输出一个合法的 JSON 对象，不要输出解释、前后缀或 Markdown。";

/// 提示词种类
///
/// 每种提示词带独立版本号，版本写入公告的 `template_version`，
/// 提示词变更后可按版本圈定需要重新处理的公告。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// 正文清洗
    ContentClean,
    /// 职位提取
    PositionExtract,
    /// 公告类型分类
    AnnouncementType,
    /// 历年分数线
    ScoreLine,
    /// 报名人数统计
    RegistrationStats,
    /// 列表页判定与选择器推荐
    ListPage,
    /// 配置连通性测试
    Ping,
}

impl PromptKind {
    pub const ALL: [PromptKind; 7] = [
        PromptKind::ContentClean,
        PromptKind::PositionExtract,
        PromptKind::AnnouncementType,
        PromptKind::ScoreLine,
        PromptKind::RegistrationStats,
        PromptKind::ListPage,
        PromptKind::Ping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::ContentClean => "content_clean",
            PromptKind::PositionExtract => "position_extract",
            PromptKind::AnnouncementType => "announcement_type",
            PromptKind::ScoreLine => "score_line",
            PromptKind::RegistrationStats => "registration_stats",
            PromptKind::ListPage => "list_page",
            PromptKind::Ping => "ping",
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            PromptKind::ContentClean => 3,
            PromptKind::PositionExtract => 4,
            PromptKind::AnnouncementType => 2,
            PromptKind::ScoreLine => 1,
            PromptKind::RegistrationStats => 1,
            PromptKind::ListPage => 2,
            PromptKind::Ping => 1,
        }
    }

    /// 形如 `position_extract@v4`
    pub fn template_version(&self) -> String {
        format!("{}@v{}", self.as_str(), self.version())
    }

    fn template(&self) -> &'static str {
        match self {
            PromptKind::ContentClean => CONTENT_CLEAN,
            PromptKind::PositionExtract => POSITION_EXTRACT,
            PromptKind::AnnouncementType => ANNOUNCEMENT_TYPE,
            PromptKind::ScoreLine => SCORE_LINE,
            PromptKind::RegistrationStats => REGISTRATION_STATS,
            PromptKind::ListPage => LIST_PAGE,
            PromptKind::Ping => PING,
        }
    }

    /// 用输入替换模板中的 `{input}`
    pub fn render(&self, input: &str) -> String {
        self.template().replace("{input}", input)
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const CONTENT_CLEAN: &str = r#"下面是一篇招录公告网页的 HTML。请去掉导航、页眉页脚、分享按钮等无关内容，提取公告本身。

返回 JSON：
{
  "title": "公告标题",
  "content": "公告正文纯文本，保留段落换行与表格内容",
  "publish_date": "YYYY-MM-DD，没有则为 null",
  "source": "发布单位，没有则为 null",
  "attachments": [{"name": "附件名", "url": "附件链接（原样保留）"}],
  "confidence": 0-100 的整数，表示提取结果的可信程度
}

HTML：
{input}"#;

const POSITION_EXTRACT: &str = r#"下面是一篇公务员或事业单位招录公告的正文。请提取其中的全部职位。

返回 JSON：
{
  "positions": [{
    "position_name": "职位名称",
    "position_code": "职位代码",
    "department_name": "招录机关",
    "department_code": "机关代码",
    "department_level": "机构层级",
    "work_location": "工作地点",
    "recruit_count": 招录人数（整数）,
    "education": "学历要求",
    "degree": "学位要求",
    "major": "专业要求，多个专业用顿号分隔",
    "political_status": "政治面貌",
    "age": "年龄要求原文",
    "work_experience": "工作经历要求原文",
    "grassroots_experience": "基层工作经历要求原文",
    "hukou": "户籍要求原文",
    "gender": "性别要求",
    "fresh_graduate": "是否限应届原文",
    "other_requirements": "其他条件",
    "notes": "备注"
  }],
  "exam_info": {
    "exam_type": "国考/省考/事业单位/选调生/遴选 等",
    "province": "省份",
    "city": "城市",
    "registration_start": "YYYY-MM-DD",
    "registration_end": "YYYY-MM-DD",
    "exam_date": "YYYY-MM-DD",
    "interview_date": "YYYY-MM-DD"
  },
  "confidence": 0-100 的整数,
  "warnings": ["提取过程中发现的问题"]
}
不确定的字段填 null，不要编造。

正文：
{input}"#;

const ANNOUNCEMENT_TYPE: &str = r#"判断下面这篇招录公告的类型，只能从以下取值中选择一个：
recruitment（招录/招聘公告）、registration_stats（报名人数统计）、written_exam（笔试公告）、
score_release（成绩或分数线公布）、qualification_review（资格复审）、interview（面试公告）、
physical_exam（体检公告）、political_review（考察/政审）、publicity（拟录用公示）、
supplement（补充或更正公告）、other（其他）。

返回 JSON：{"announcement_type": "取值", "exam_type": "考试类型或 null", "confidence": 0-100}

公告：
{input}"#;

const SCORE_LINE: &str = r#"下面是一篇成绩或分数线公告。请提取每个职位的进面分数线。

返回 JSON：
{
  "score_lines": [{"position_code": "职位代码", "position_name": "职位名称", "department_name": "招录机关",
                   "min_score": 最低分, "max_score": 最高分, "year": 年份}],
  "confidence": 0-100
}

公告：
{input}"#;

const REGISTRATION_STATS: &str = r#"下面是一篇报名人数统计公告。请提取每个职位的报名情况。

返回 JSON：
{
  "stats": [{"position_code": "职位代码", "position_name": "职位名称", "department_name": "招录机关",
             "recruit_count": 招录人数, "applicant_count": 报名或审核通过人数, "competition_ratio": 竞争比}],
  "confidence": 0-100
}

公告：
{input}"#;

const LIST_PAGE: &str = r#"下面是一个网页的简化 HTML 结构。判断它是否是列出多篇公告或新闻的列表页；
如果是，给出能选中每篇文章链接（a 标签）的 CSS 选择器。

返回 JSON：{"is_list_page": true 或 false, "article_selector": "CSS 选择器或 null", "confidence": 0-100}

HTML：
{input}"#;

const PING: &str = r#"返回 JSON：{"ok": true}。{input}"#;
