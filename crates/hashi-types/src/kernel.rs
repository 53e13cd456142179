//! Kernel metadata types.
//!
//! [`KernelInfo`] is what a front-end learns from `kernel_info_request`;
//! [`KernelSpec`] is what the host registers so front-ends can offer the
//! kernel at all. Both are immutable once the kernel is constructed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::ReplyStatus;
use crate::message::PROTOCOL_VERSION;

/// Editor mode hint for the front-end's code editor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodemirrorMode {
    pub name: String,
    pub version: u32,
}

/// Description of the implemented language.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub mimetype: String,
    pub file_extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codemirror_mode: Option<CodemirrorMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pygments_lexer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbconvert_exporter: Option<String>,
}

/// A help menu entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpLink {
    pub text: String,
    pub url: String,
}

/// `kernel_info_reply` content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelInfo {
    pub status: ReplyStatus,
    pub protocol_version: String,
    pub implementation: String,
    pub implementation_version: String,
    pub language_info: LanguageInfo,
    pub banner: String,
    #[serde(default)]
    pub help_links: Vec<HelpLink>,
}

impl Default for KernelInfo {
    /// A WebAssembly Python runtime.
    fn default() -> Self {
        Self {
            status: ReplyStatus::Ok,
            protocol_version: PROTOCOL_VERSION.to_string(),
            implementation: "pyodide".to_string(),
            implementation_version: "0.1.0".to_string(),
            language_info: LanguageInfo {
                name: "python".to_string(),
                version: "3.8".to_string(),
                mimetype: "text/x-python".to_string(),
                file_extension: ".py".to_string(),
                codemirror_mode: Some(CodemirrorMode {
                    name: "python".to_string(),
                    version: 3,
                }),
                pygments_lexer: Some("ipython3".to_string()),
                nbconvert_exporter: Some("python".to_string()),
            },
            banner: "Hashi: a WebAssembly-powered Python kernel bridge".to_string(),
            help_links: vec![HelpLink {
                text: "Python (WASM) Kernel".to_string(),
                url: "https://pyodide.org".to_string(),
            }],
        }
    }
}

/// How the front-end should interrupt a running kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptMode {
    Signal,
    #[default]
    Message,
}

/// Kernel specification registered with the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Registry key (e.g. `python`).
    pub name: String,
    pub display_name: String,
    pub language: String,
    #[serde(default)]
    pub argv: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub interrupt_mode: InterruptMode,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Resource name → URL (logos).
    #[serde(default)]
    pub resources: BTreeMap<String, String>,
}

impl Default for KernelSpec {
    fn default() -> Self {
        let mut resources = BTreeMap::new();
        resources.insert("logo-64x64".to_string(), "/kernelspecs/python.png".to_string());
        Self {
            name: "python".to_string(),
            display_name: "Hashi".to_string(),
            language: "python".to_string(),
            argv: Vec::new(),
            env: BTreeMap::new(),
            interrupt_mode: InterruptMode::Message,
            metadata: serde_json::Map::new(),
            resources,
        }
    }
}
