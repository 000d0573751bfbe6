pub mod maskawa;
pub mod naijadatasub;

pub use maskawa::MaskawaProvider;
pub use naijadatasub::NaijadatasubProvider;

/// Credentials resolved from settings for one call
#[derive(Clone)]
pub struct VendorConfig {
    pub token: String,
    /// Without trailing slash
    pub base_url: String,
}

impl VendorConfig {
    pub fn new(token: impl Into<String>, base_url: &str) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl std::fmt::Debug for VendorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorConfig")
            .field("token", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}
