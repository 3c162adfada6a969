//! Text extraction, bot-prefix matching, test-intent detection and command parsing.
//!
//! Everything here is pure; the [`super::handler`] module decides what to send.

use crate::protobuf::meshtastic_generated::Data;

/// English keywords recognised as a "testing" ping.
pub const ENGLISH_TEST_KEYWORDS: [&str; 2] = ["test", "testing"];
/// Messages longer than this are never treated as test pings.
pub const TEST_INTENT_MAX_CHARS: usize = 10;
/// Page size of the help listing.
pub const HELP_PAGE_CHARS: usize = 80;
/// Generic replies echo at most this many characters of the command.
pub const ECHO_MAX_CHARS: usize = 50;

/// Strict UTF-8 decode of a payload, trimmed. Invalid or blank payloads carry no text.
pub fn extract_text(data: &Data) -> Option<String> {
    let text = std::str::from_utf8(&data.payload).ok()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Strip a bot prefix (case-insensitive, first match wins) and return the trimmed rest.
///
/// `Some("")` is a valid, empty command; `None` means no prefix matched.
pub fn extract_command(text: &str, prefixes: &[String]) -> Option<String> {
    for prefix in prefixes.iter().filter(|p| !p.is_empty()) {
        let prefix_chars = prefix.chars().count();
        let head: String = text.chars().take(prefix_chars).collect();
        if head.to_lowercase() == prefix.to_lowercase() {
            let rest: String = text.chars().skip(prefix_chars).collect();
            return Some(rest.trim().to_string());
        }
    }
    None
}

/// Short messages like "test", "testing 123" or anything containing a configured
/// keyword ("測試") count as a test ping.
pub fn is_test_message(text: &str, keywords: &[String]) -> bool {
    let clean = text.trim().to_lowercase();
    if clean.chars().count() > TEST_INTENT_MAX_CHARS {
        return false;
    }
    let words: Vec<&str> = clean.split_whitespace().collect();
    for kw in ENGLISH_TEST_KEYWORDS {
        if clean == kw || (words.contains(&kw) && words.len() <= 3) {
            return true;
        }
    }
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| clean.contains(&k.to_lowercase()))
}

/// First token (lowercased) and the remaining arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: String,
}

pub fn split_command(command: &str) -> ParsedCommand {
    let trimmed = command.trim();
    match trimmed.find(char::is_whitespace) {
        Some(idx) => ParsedCommand {
            name: trimmed[..idx].to_lowercase(),
            args: trimmed[idx..].trim_start().to_string(),
        },
        None => ParsedCommand {
            name: trimmed.to_lowercase(),
            args: String::new(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help { page: String },
    Weather,
    Ab { args: String },
    Ai { query: String },
    /// Empty or unrecognised command; carries the full command string.
    Generic { text: String },
}

impl Command {
    pub fn parse(command: &str) -> Command {
        let parsed = split_command(command);
        match parsed.name.as_str() {
            "help" => Command::Help { page: parsed.args },
            "weather" => Command::Weather,
            "ab" => Command::Ab { args: parsed.args },
            "askai" | "ask" | "ai" => Command::Ai { query: parsed.args },
            _ => Command::Generic {
                text: command.trim().to_string(),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Help { .. } => "help",
            Command::Weather => "weather",
            Command::Ab { .. } => "ab",
            Command::Ai { .. } => "ai",
            Command::Generic { .. } => "generic",
        }
    }
}

/// First `max_chars` characters of `s`, with `marker` appended when cut.
pub fn truncate_chars(s: &str, max_chars: usize, marker: &str) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str(marker);
    out
}

/// Split text into pages of at most `max_chars` characters on line boundaries.
/// A single line longer than a page is force-split at character boundaries.
/// Every page, including a lone one, has trailing whitespace removed.
pub fn paginate(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pages = Vec::new();

    if text.chars().count() <= max_chars {
        pages.push(text.to_string());
    } else {
        let mut current = String::new();
        let mut current_len = 0usize;

        for line in text.split('\n') {
            let line_len = line.chars().count();
            if current_len + line_len + 1 <= max_chars {
                current.push_str(line);
                current.push('\n');
                current_len += line_len + 1;
                continue;
            }
            if !current.is_empty() {
                pages.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if line_len > max_chars {
                let chars: Vec<char> = line.chars().collect();
                let mut chunks = chars.chunks(max_chars).peekable();
                while let Some(chunk) = chunks.next() {
                    let piece: String = chunk.iter().collect();
                    if chunks.peek().is_some() {
                        pages.push(piece);
                    } else {
                        current = piece;
                        current.push('\n');
                        current_len = chunk.len() + 1;
                    }
                }
            } else {
                current.push_str(line);
                current.push('\n');
                current_len = line_len + 1;
            }
        }
        pages.push(current);
    }

    let mut pages: Vec<String> = pages
        .into_iter()
        .map(|p| p.trim_end().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if pages.is_empty() {
        pages.push(String::new());
    }
    pages
}

/// Page number for a `help` argument: blank is page 1, numbers clamp to
/// `[1, total]`, anything else yields `None` (no reply).
pub fn resolve_help_page(arg: &str, total: usize) -> Option<usize> {
    let arg = arg.trim();
    let total = total.max(1) as i64;
    let requested = if arg.is_empty() {
        1
    } else {
        arg.parse::<i64>().ok()?
    };
    Some(requested.clamp(1, total) as usize)
}

pub struct HelpEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub usage: &'static str,
}

pub fn help_entries(ai_enabled: bool) -> Vec<HelpEntry> {
    let mut entries = vec![
        HelpEntry {
            name: "help",
            description: "顯示所有可用指令的詳細說明",
            usage: "help [頁碼]",
        },
        HelpEntry {
            name: "ab",
            description: "由我協助您呼叫 ARBot 機器人",
            usage: "ab [指令]",
        },
        HelpEntry {
            name: "weather",
            description: "查詢您所在位置的天氣狀況（需開啟定位分享，每分鐘限用一次）",
            usage: "weather",
        },
    ];
    if ai_enabled {
        entries.push(HelpEntry {
            name: "ai",
            description: "向 AI 助理提問，回覆會分段傳送",
            usage: "ai [問題]",
        });
    }
    entries
}

/// Command listing without header; this is what gets paginated.
pub fn help_block(entries: &[HelpEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        out.push_str(&format!("• {}: {}\n", e.name, e.description));
        out.push_str(&format!("  用法: {}\n", e.usage));
    }
    out
}

pub fn help_page_text(bot_name: &str, prefix: &str, page: usize, total: usize, body: &str) -> String {
    format!(
        "{} 說明 第{}/{}頁；使用 {} 前綴\n{}",
        bot_name, page, total, prefix, body
    )
}

/// Reply of the generic responder: greeting, echoed command (if any), promo line.
pub fn generic_reply(sender_tag: &str, command: &str, promo: &str) -> String {
    let flattened = command.replace('\n', " ");
    let echo = truncate_chars(flattened.trim(), ECHO_MAX_CHARS, "...");
    let mut body = String::from("已收到：\n");
    if !echo.is_empty() {
        body.push_str(&echo);
        body.push_str("\n\n");
    }
    body.push_str(promo);
    format!("嗨！{}，{}", sender_tag, body)
}
