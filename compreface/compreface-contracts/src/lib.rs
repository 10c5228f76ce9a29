use serde::Deserialize;

/// Connection settings for the CompreFace recognizer. Each API role carries
/// its own key; the verification key is optional and only needed when a
/// verification service is provisioned.
#[derive(Debug, clap::Parser, Clone, Deserialize)]
pub struct CompreFaceConfig {
    #[clap(long, env = "COMPREFACE_URL", help = "CompreFace API URL")]
    pub compreface_url: String,

    #[clap(
        long,
        env = "COMPREFACE_RECOGNITION_API_KEY",
        help = "API key of the recognition service"
    )]
    pub recognition_api_key: String,

    #[clap(
        long,
        env = "COMPREFACE_DETECTION_API_KEY",
        help = "API key of the detection service"
    )]
    pub detection_api_key: String,

    #[clap(
        long,
        env = "COMPREFACE_VERIFICATION_API_KEY",
        help = "API key of the verification service"
    )]
    pub verification_api_key: Option<String>,

    /// Per-request timeout in seconds
    #[clap(long, env = "COMPREFACE_TIMEOUT_SECONDS", default_value = "60")]
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    60
}
