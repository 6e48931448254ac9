//! Prompts for page-level and document-level summarization.
//!
//! Every prompt lives here so wording changes never touch orchestration code,
//! and tests can assert on prompt content without a live model.
//!
//! Output is Traditional Chinese. The model is asked for bare bullet text;
//! page citations and length limits are applied locally afterwards because
//! models do not follow formatting instructions reliably.

use crate::classify::Classification;

/// Default system prompt shared by page and global calls.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是文件摘要專家，先給結論再給細節，並提出可執行的建議。\
全程使用繁體中文。不得逐字照抄原文，不得使用省略號（「..」或「…」），不得寫空泛的套話。\
所有輸出都必須能回溯到原文，並以 JSON 物件回覆。";

/// Build the user prompt for one page.
///
/// `text` must already be cut to the page character budget.
pub fn page_prompt(page_number: usize, classification: Classification, text: &str) -> String {
    format!(
        "請分析第 {page_number} 頁的內容，頁面分類：{classification}。\n\
以下為頁面文字（過長時已截斷）：\n\
\"\"\"\n{text}\n\"\"\"\n\n\
請改寫成 3 到 5 條要點，建議 4 條。每條不超過 30 個全形字，只講一件事\
（事實、結論、數據、風險或待辦），數據需保留單位、時間與比較方向。\n\
只輸出 JSON：{{\"bullets\": [\"要點一\", \"要點二\", \"要點三\", \"要點四\"]}}\n\
不要加頁碼，也不要加項目符號，這些會在後續處理。"
    )
}

/// Build the user prompt for the document-level summary.
///
/// `page_points` is one citation-prefixed bullet per line.
pub fn global_prompt(page_points: &str) -> String {
    format!(
        "以下是每一頁的要點：\n{page_points}\n\n\
請彙整成全文摘要，只輸出 JSON：\n\
{{\n\
  \"overview\": [\"總結一\", \"總結二\", \"總結三\", \"總結四\", \"總結五\"],\n\
  \"expansions\": {{\n\
    \"key_conclusions\": \"關鍵結論，一段不超過 120 字\",\n\
    \"core_data\": \"核心數據，一段不超過 120 字，並註明頁碼範圍\",\n\
    \"risks_and_actions\": \"風險與行動，一段不超過 120 字，依優先順序排列\"\n\
  }}\n\
}}\n\
overview 需 5 到 7 條，每條不超過 35 字。三段擴充都必須是完整句子，不得使用省略號。"
    )
}

/// Placeholder fed to the global prompt when no page produced a bullet.
pub const EMPTY_PAGE_POINTS: &str = "（暫無要點）";
