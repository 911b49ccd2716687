use thiserror::Error;

/// 目錄操作錯誤
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP 請求失敗: {0}")]
    Http(String),

    #[error("GraphQL 錯誤: {0}")]
    GraphQl(String),

    #[error("無法解析目錄回應: {0}")]
    Decode(String),

    #[error("找不到單元: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}
