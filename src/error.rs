use thiserror::Error;

/// Main error type for modelpull
#[derive(Error, Debug)]
pub enum PullError {
    #[error("Access denied to '{repo}'\n\nTroubleshooting:\n- Run huggingface-cli login to authenticate\n- Or pass --hf-token <TOKEN> / set HF_TOKEN\n- Gated models also require accepting their license on huggingface.co")]
    AuthRequired { repo: String },

    #[error("Download failed: HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Network error: {0}\n\nTroubleshooting:\n- Check internet connection\n- Verify firewall or proxy settings\n- Try increasing hub.timeout_secs in config")]
    Network(String),

    #[error("Conversion error: {0}\n\nTroubleshooting:\n- Check converter.program and converter.args in config\n- Run with RUST_LOG=debug to see the converter command line")]
    Conversion(String),

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/modelpull/config.toml\n- Check the model catalog entry for this model\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Quantization table error: {0}")]
    Quant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PullError {
    /// Whether this is an HTTP rejection of the supplied credential (401/403)
    #[must_use]
    pub const fn is_auth_status(&self) -> bool {
        matches!(self, Self::Http { status: 401 | 403, .. })
    }
}

pub type Result<T> = std::result::Result<T, PullError>;
