//! Offline English -> Chinese substitution translator.
//!
//! Not a real translation engine: it swaps common phrases and words for
//! their Chinese equivalents so a reader can skim a post's gist without a
//! network round-trip. Phrases are applied before single words.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use crate::error::TranslationError;
use crate::translate::Translator;

const PHRASES: &[(&str, &str)] = &[
    ("going up", "上涨"),
    ("going down", "下跌"),
    ("right now", "现在"),
    ("just now", "刚刚"),
    ("breaking news", "突发新闻"),
    ("coming soon", "即将到来"),
    ("new update", "新更新"),
    ("stock price", "股价"),
    ("market cap", "市值"),
    ("AI technology", "AI技术"),
    ("new product", "新产品"),
    ("big news", "重大新闻"),
    ("just launched", "刚推出"),
    ("1 hour ago", "1小时前"),
    ("2 hours ago", "2小时前"),
    ("3 hours ago", "3小时前"),
    ("1 day ago", "1天前"),
    ("2 days ago", "2天前"),
    ("1 week ago", "1周前"),
];

const WORDS: &[(&str, &str)] = &[
    ("and", "和"),
    ("or", "或"),
    ("but", "但是"),
    ("so", "所以"),
    ("because", "因为"),
    ("will", "将"),
    ("would", "会"),
    ("can", "可以"),
    ("should", "应该"),
    ("must", "必须"),
    ("is", "是"),
    ("are", "是"),
    ("was", "是"),
    ("were", "是"),
    ("have", "有"),
    ("has", "有"),
    ("do", "做"),
    ("does", "做"),
    ("did", "做了"),
    ("get", "获得"),
    ("got", "获得了"),
    ("company", "公司"),
    ("business", "商业"),
    ("market", "市场"),
    ("stock", "股票"),
    ("price", "价格"),
    ("investment", "投资"),
    ("technology", "技术"),
    ("product", "产品"),
    ("service", "服务"),
    ("user", "用户"),
    ("customer", "客户"),
    ("update", "更新"),
    ("launch", "推出"),
    ("release", "发布"),
    ("announce", "宣布"),
    ("said", "说"),
    ("says", "说"),
    ("think", "认为"),
    ("believe", "相信"),
    ("launched", "推出了"),
    ("released", "发布了"),
    ("announced", "宣布了"),
    ("shared", "分享了"),
    ("posted", "发布了"),
    ("tweeted", "发推说"),
    ("today", "今天"),
    ("yesterday", "昨天"),
    ("tomorrow", "明天"),
    ("now", "现在"),
    ("hour", "小时"),
    ("hours", "小时"),
    ("day", "天"),
    ("days", "天"),
    ("week", "周"),
    ("month", "月"),
    ("year", "年"),
    ("ago", "前"),
    ("later", "后"),
    ("new", "新"),
    ("big", "大"),
    ("small", "小"),
    ("good", "好"),
    ("great", "很棒"),
    ("bad", "坏"),
    ("better", "更好"),
    ("best", "最好"),
    ("important", "重要"),
];

const DROPPED: &[&str] = &["the", "a", "an"];

/// Phrase/word substitution translator with precompiled patterns.
pub struct DictionaryTranslator {
    rules: Vec<(Regex, &'static str)>,
    whitespace: Regex,
}

impl DictionaryTranslator {
    pub fn new() -> Result<Self, TranslationError> {
        let substitutions = PHRASES.iter().chain(WORDS.iter()).copied();
        let drops = DROPPED.iter().map(|w| (*w, ""));

        let rules = substitutions
            .chain(drops)
            .map(|(from, to)| Ok((word_pattern(from)?, to)))
            .collect::<Result<Vec<_>, regex::Error>>()
            .map_err(unavailable)?;

        let whitespace = Regex::new(r"\s+").map_err(unavailable)?;

        Ok(Self { rules, whitespace })
    }

    /// Apply every rule in order and collapse whitespace.
    pub fn apply(&self, text: &str) -> String {
        let substituted = self
            .rules
            .iter()
            .fold(text.to_string(), |acc, (pattern, replacement)| {
                pattern.replace_all(&acc, *replacement).into_owned()
            });

        self.whitespace
            .replace_all(&substituted, " ")
            .trim()
            .to_string()
    }
}

fn word_pattern(word: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(word)))
        .case_insensitive(true)
        .build()
}

fn unavailable(err: regex::Error) -> TranslationError {
    TranslationError::Unavailable {
        message: err.to_string(),
    }
}

#[async_trait]
impl Translator for DictionaryTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        Ok(self.apply(text))
    }

    fn backend_name(&self) -> &str {
        "dictionary"
    }
}
