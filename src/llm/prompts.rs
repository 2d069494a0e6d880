//! Scouter instruction text and request construction.
//!
//! The instruction is the contract between the app and the model: five
//! comma-separated fields on one line, in this order, no header row:
//! name, job, species, score, rationale. The parser depends on it.
//! Bump `INSTRUCTION_VERSION` whenever the wording changes.

use super::types::{ContentPart, ImageUrl, InferenceRequest, Message, Role};
use crate::codec::transport;

pub const INSTRUCTION_VERSION: &str = "scouter-v1";

/// Language the model is asked to answer in. Also decides the sentinel
/// the model uses when it cannot name the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyLanguage {
    Japanese,
    English,
}

impl ReplyLanguage {
    /// Parse an ISO 639-1 code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "ja" | "jp" | "japanese" => Some(Self::Japanese),
            "en" | "english" => Some(Self::English),
            _ => None,
        }
    }

    /// The value the model writes in the name field when the name is unknown.
    pub fn unknown_sentinel(self) -> &'static str {
        match self {
            Self::Japanese => "不明",
            Self::English => "unknown",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Self::Japanese => INSTRUCTION_JA,
            Self::English => INSTRUCTION_EN,
        }
    }
}

const INSTRUCTION_JA: &str = "画像に表示されているオブジェクトから以下を抽出してください。
名前：画像イメージから名前を割り出してください。名前が不明な場合は不明にしてください。
職業：画像イメージから職業を割り出してください。
種族：画像イメージから種族を割り出してください。
戦闘力：画像に表示されているオブジェクトをドラゴンボールのスカウターのように戦闘力で答えてください。カンマ(,)は除外してください。
解説：戦闘力の値についての根拠をお願いします。
それぞれ日本語でご回答お願いします。
返答は以下の順番でCSV形式で1行で出力してください。見出し行は不要です。
・名前
・職業
・種族
・戦闘力
・解説";

const INSTRUCTION_EN: &str = "Extract the following from the object shown in the image.
Name: work out the object's name from the image. If the name cannot be determined, write unknown.
Job: work out the object's occupation from the image.
Species: work out the object's species from the image.
Score: state the object's battle power the way a Dragon Ball scouter would. Digits only, no commas.
Rationale: explain the reasoning behind the battle power value. Do not use commas.
Answer every field in English.
Reply with a single CSV line in exactly this order, with no header row:
- name
- job
- species
- score
- rationale";

/// Build the chat request for one captured image.
///
/// Always one system message with the instruction text followed by one
/// user message with a single image reference.
pub fn build_request(base64_jpeg: &str, model: &str, language: ReplyLanguage) -> InferenceRequest {
    InferenceRequest {
        model: model.to_string(),
        messages: vec![
            Message {
                role: Role::System,
                content: vec![ContentPart::Text {
                    text: language.instruction().to_string(),
                }],
            },
            Message {
                role: Role::User,
                content: vec![ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: transport::data_uri(base64_jpeg),
                    },
                }],
            },
        ],
    }
}
