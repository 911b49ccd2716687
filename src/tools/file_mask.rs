use regex::Regex;

/// 檔名過濾條件，支援 shell 風格的 `*` 與 `?`
#[derive(Debug, Clone)]
pub struct FileMask {
    pattern: String,
    regex: Regex,
}

impl FileMask {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        Ok(Self {
            pattern: pattern.to_string(),
            regex: Regex::new(&expr)?,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }
}
