//! User-facing texts in English and Persian.

use crate::download::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    Fa,
}

impl Lang {
    /// Picks a language from a Telegram `language_code`.
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(|c| c.to_ascii_lowercase()) {
            Some(c) if c == "fa" || c.starts_with("fa-") => Lang::Fa,
            _ => Lang::En,
        }
    }
}

/// What a user is told when something in the pipeline fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureBucket {
    TooLarge,
    NotFound,
    TemporarilyUnavailable,
    InvalidInput,
}

impl From<&PipelineError> for FailureBucket {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::Oversize { .. } => FailureBucket::TooLarge,
            PipelineError::NotFound(_) => FailureBucket::NotFound,
            PipelineError::InvalidInput(_) => FailureBucket::InvalidInput,
            PipelineError::Timeout(_)
            | PipelineError::Network(_)
            | PipelineError::Extraction(_)
            | PipelineError::Persistence(_)
            | PipelineError::RetryAfter(_)
            | PipelineError::Cancelled
            | PipelineError::Io(_) => FailureBucket::TemporarilyUnavailable,
        }
    }
}

impl FailureBucket {
    pub fn message(self, lang: Lang) -> &'static str {
        match (self, lang) {
            (FailureBucket::TooLarge, Lang::En) => "❌ The file is too large.",
            (FailureBucket::TooLarge, Lang::Fa) => "❌ حجم فایل بیش از حد مجاز است.",
            (FailureBucket::NotFound, Lang::En) => "❌ Not found. The link may be wrong or the video was removed.",
            (FailureBucket::NotFound, Lang::Fa) => "❌ یافت نشد. ممکن است لینک اشتباه باشد یا ویدیو حذف شده باشد.",
            (FailureBucket::TemporarilyUnavailable, Lang::En) => "⚠️ Temporarily unavailable. Please try again later.",
            (FailureBucket::TemporarilyUnavailable, Lang::Fa) => "⚠️ موقتاً در دسترس نیست. لطفاً بعداً دوباره تلاش کنید.",
            (FailureBucket::InvalidInput, Lang::En) => "❌ Invalid input. Please check and try again.",
            (FailureBucket::InvalidInput, Lang::Fa) => "❌ ورودی نامعتبر است. لطفاً بررسی کرده و دوباره تلاش کنید.",
        }
    }
}

/// Failure text for `err` in `lang`.
pub fn failure_text(err: &PipelineError, lang: Lang) -> &'static str {
    FailureBucket::from(err).message(lang)
}

pub fn welcome(lang: Lang) -> &'static str {
    match lang {
        Lang::En => "🎬 Welcome! Open a video link shared by the channel to receive the file.",
        Lang::Fa => "🎬 خوش آمدید! برای دریافت فایل، روی لینک ویدیو که در کانال منتشر شده بزنید.",
    }
}

pub fn rate_limited(lang: Lang) -> &'static str {
    match lang {
        Lang::En => "⏳ Too many requests. Please wait a minute.",
        Lang::Fa => "⏳ درخواست‌های شما زیاد است. لطفاً یک دقیقه صبر کنید.",
    }
}

pub fn admin_only(lang: Lang) -> &'static str {
    match lang {
        Lang::En => "⛔ This command is for administrators.",
        Lang::Fa => "⛔ این دستور فقط برای مدیران است.",
    }
}

pub const UPLOAD_USAGE: &str = "Usage: /upload <collection_id> <quality> <url> [season] [episode]\n\
     Quality: 480p, 720p, 1080p, 1440p, 4k";

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_every_error_has_a_bucket() {
        let cases = [
            (PipelineError::Oversize { size: 2, max: 1 }, FailureBucket::TooLarge),
            (PipelineError::NotFound("x".into()), FailureBucket::NotFound),
            (PipelineError::InvalidInput("x".into()), FailureBucket::InvalidInput),
            (PipelineError::Timeout("x".into()), FailureBucket::TemporarilyUnavailable),
            (PipelineError::Network("x".into()), FailureBucket::TemporarilyUnavailable),
            (PipelineError::Extraction("x".into()), FailureBucket::TemporarilyUnavailable),
            (PipelineError::Persistence("x".into()), FailureBucket::TemporarilyUnavailable),
            (
                PipelineError::RetryAfter(Duration::from_secs(1)),
                FailureBucket::TemporarilyUnavailable,
            ),
            (PipelineError::Cancelled, FailureBucket::TemporarilyUnavailable),
        ];
        for (err, bucket) in cases {
            assert_eq!(FailureBucket::from(&err), bucket, "{:?}", err);
        }
    }

    #[test]
    fn test_messages_differ_by_language() {
        for bucket in [
            FailureBucket::TooLarge,
            FailureBucket::NotFound,
            FailureBucket::TemporarilyUnavailable,
            FailureBucket::InvalidInput,
        ] {
            assert_ne!(bucket.message(Lang::En), bucket.message(Lang::Fa));
        }
    }

    #[test]
    fn test_lang_from_code() {
        assert_eq!(Lang::from_code(Some("fa")), Lang::Fa);
        assert_eq!(Lang::from_code(Some("FA-IR")), Lang::Fa);
        assert_eq!(Lang::from_code(Some("en")), Lang::En);
        assert_eq!(Lang::from_code(None), Lang::En);
    }
}
