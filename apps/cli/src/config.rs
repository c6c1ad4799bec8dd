use std::{collections::HashMap, fs, path::PathBuf};

use media_integration::DEFAULT_CAPTION_MODEL;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base_url: String,
    pub token_path: PathBuf,
    pub cdn_base_url: String,
    pub cdn_cloud_name: Option<String>,
    pub cdn_upload_preset: Option<String>,
    pub caption_base_url: String,
    pub caption_api_key: Option<String>,
    pub caption_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8090".into(),
            token_path: "./.vistagram/token".into(),
            cdn_base_url: "https://api.cloudinary.com".into(),
            cdn_cloud_name: None,
            cdn_upload_preset: None,
            caption_base_url: "https://generativelanguage.googleapis.com".into(),
            caption_api_key: None,
            caption_model: DEFAULT_CAPTION_MODEL.into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("vistagram.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("api_base_url") {
                settings.api_base_url = v.clone();
            }
            if let Some(v) = file_cfg.get("token_path") {
                settings.token_path = v.clone().into();
            }
            if let Some(v) = file_cfg.get("cdn_base_url") {
                settings.cdn_base_url = v.clone();
            }
            if let Some(v) = file_cfg.get("cdn_cloud_name") {
                settings.cdn_cloud_name = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("cdn_upload_preset") {
                settings.cdn_upload_preset = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("caption_base_url") {
                settings.caption_base_url = v.clone();
            }
            if let Some(v) = file_cfg.get("caption_api_key") {
                settings.caption_api_key = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("caption_model") {
                settings.caption_model = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("VISTAGRAM_API_URL") {
        settings.api_base_url = v;
    }
    if let Ok(v) = std::env::var("VISTAGRAM_TOKEN_PATH") {
        settings.token_path = v.into();
    }
    if let Ok(v) = std::env::var("VISTAGRAM_CDN_URL") {
        settings.cdn_base_url = v;
    }
    if let Ok(v) = std::env::var("VISTAGRAM_CDN_CLOUD_NAME") {
        settings.cdn_cloud_name = Some(v);
    }
    if let Ok(v) = std::env::var("VISTAGRAM_CDN_UPLOAD_PRESET") {
        settings.cdn_upload_preset = Some(v);
    }
    if let Ok(v) = std::env::var("VISTAGRAM_CAPTION_URL") {
        settings.caption_base_url = v;
    }
    if let Ok(v) = std::env::var("VISTAGRAM_CAPTION_API_KEY") {
        settings.caption_api_key = Some(v);
    }
    if let Ok(v) = std::env::var("VISTAGRAM_CAPTION_MODEL") {
        settings.caption_model = v;
    }

    settings.api_base_url = normalize_base_url(&settings.api_base_url);
    settings.cdn_base_url = normalize_base_url(&settings.cdn_base_url);
    settings.caption_base_url = normalize_base_url(&settings.caption_base_url);

    settings
}

fn normalize_base_url(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');

    if raw.is_empty() {
        return Settings::default().api_base_url;
    }

    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    }
}
