use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

pub const CONFIG_PATH_VAR: &str = "PNEUMOSCAN_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialStrategy {
    Ambient,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageStrategy {
    Local,
    ObjectStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateStrategy {
    Grayscale,
    Aspect,
}

impl FromStr for CredentialStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ambient" | "default" => Ok(CredentialStrategy::Ambient),
            "file" | "service-account" => Ok(CredentialStrategy::File),
            _ => Err(()),
        }
    }
}

impl FromStr for StorageStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "local-disk" => Ok(StorageStrategy::Local),
            "object-store" | "bucket" | "s3" | "gcs" => Ok(StorageStrategy::ObjectStore),
            _ => Err(()),
        }
    }
}

impl FromStr for GateStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grayscale" | "grayscale-ratio" => Ok(GateStrategy::Grayscale),
            "aspect" | "aspect-size" => Ok(GateStrategy::Aspect),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub strategy: CredentialStrategy,
    pub service_account_file: Option<PathBuf>,
    /// Credentials file named by `GOOGLE_APPLICATION_CREDENTIALS`, or the
    /// one `gcloud auth application-default login` writes.
    pub application_default_file: Option<PathBuf>,
    pub metadata_host: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            strategy: CredentialStrategy::Ambient,
            service_account_file: None,
            application_default_file: None,
            metadata_host: "metadata.google.internal".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub strategy: StorageStrategy,
    pub upload_dir: PathBuf,
    pub bucket: Option<String>,
    pub endpoint_url: Option<String>,
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            strategy: StorageStrategy::Local,
            upload_dir: PathBuf::from("static/uploads"),
            bucket: None,
            endpoint_url: None,
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub strategy: GateStrategy,
    pub channel_tolerance: u8,
    pub min_gray_ratio: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            strategy: GateStrategy::Grayscale,
            channel_tolerance: 10,
            min_gray_ratio: 0.75,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_address: String,
    pub port: u16,
    pub image_size: u32,
    pub endpoint_url: String,
    pub credentials: CredentialsConfig,
    pub storage: StorageConfig,
    pub gate: GateConfig,
    pub session_secret: String,
    pub request_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub temp_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            image_size: 150,
            endpoint_url: String::new(),
            credentials: CredentialsConfig::default(),
            storage: StorageConfig::default(),
            gate: GateConfig::default(),
            session_secret: String::new(),
            request_timeout_secs: 30,
            max_upload_bytes: 10 * 1024 * 1024,
            temp_dir: None,
        }
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

const ADC_FILE_NAME: &str = "application_default_credentials.json";

/// Location of the gcloud application default credentials file, when it
/// exists. `CLOUDSDK_CONFIG` relocates the gcloud config directory.
fn well_known_adc_file<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let config_dir = match lookup("CLOUDSDK_CONFIG") {
        Some(dir) => PathBuf::from(dir),
        None => match lookup("APPDATA") {
            Some(app_data) if cfg!(windows) => PathBuf::from(app_data).join("gcloud"),
            _ => PathBuf::from(lookup("HOME")?).join(".config").join("gcloud"),
        },
    };
    let path = config_dir.join(ADC_FILE_NAME);
    path.is_file().then_some(path)
}

impl AppConfig {
    /// Defaults, then the YAML file named by `PNEUMOSCAN_CONFIG`, then the
    /// process environment (including a `.env` file).
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_yaml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        let config = config.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Applies environment-style overrides. `lookup` returns the value for a
    /// variable name, if set.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BIND_ADDRESS") {
            self.bind_address = v;
        }
        if let Some(v) = lookup("PORT") {
            self.port = parse_var("PORT", v)?;
        }
        if let Some(v) = lookup("IMG_SIZE") {
            self.image_size = parse_var("IMG_SIZE", v)?;
        }
        if let Some(v) = lookup("VERTEX_ENDPOINT") {
            self.endpoint_url = v;
        }
        if let Some(v) = lookup("CREDENTIALS") {
            self.credentials.strategy = parse_var("CREDENTIALS", v)?;
        }
        if let Some(v) = lookup("SERVICE_ACCOUNT_FILE") {
            self.credentials.service_account_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("GOOGLE_APPLICATION_CREDENTIALS") {
            self.credentials.application_default_file = Some(PathBuf::from(v));
        }
        if self.credentials.application_default_file.is_none() {
            self.credentials.application_default_file = well_known_adc_file(&lookup);
        }
        if let Some(v) = lookup("GCE_METADATA_HOST") {
            self.credentials.metadata_host = v;
        }
        if let Some(v) = lookup("STORAGE") {
            self.storage.strategy = parse_var("STORAGE", v)?;
        }
        if let Some(v) = lookup("UPLOAD_FOLDER") {
            self.storage.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("BUCKET_NAME") {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = lookup("OBJECT_STORE_ENDPOINT") {
            self.storage.endpoint_url = Some(v);
        }
        if let Some(v) = lookup("OBJECT_STORE_PUBLIC_URL") {
            self.storage.public_base_url = Some(v);
        }
        if let Some(v) = lookup("XRAY_GATE") {
            self.gate.strategy = parse_var("XRAY_GATE", v)?;
        }
        if let Some(v) = lookup("SESSION_SECRET") {
            self.session_secret = v;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", v)?;
        }
        if let Some(v) = lookup("TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::Missing("VERTEX_ENDPOINT"));
        }
        Url::parse(&self.endpoint_url).map_err(|_| ConfigError::Invalid {
            key: "VERTEX_ENDPOINT",
            value: self.endpoint_url.clone(),
        })?;

        if self.image_size == 0 {
            return Err(ConfigError::Invalid {
                key: "IMG_SIZE",
                value: self.image_size.to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REQUEST_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.gate.min_gray_ratio) {
            return Err(ConfigError::Invalid {
                key: "gate.min_gray_ratio",
                value: self.gate.min_gray_ratio.to_string(),
            });
        }

        if self.credentials.strategy == CredentialStrategy::File
            && self.credentials.service_account_file.is_none()
        {
            return Err(ConfigError::Missing("SERVICE_ACCOUNT_FILE"));
        }

        if self.storage.strategy == StorageStrategy::ObjectStore {
            match &self.storage.bucket {
                Some(bucket) if !bucket.trim().is_empty() => {}
                _ => return Err(ConfigError::Missing("BUCKET_NAME")),
            }
        }

        Ok(())
    }
}
