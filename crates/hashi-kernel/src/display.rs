//! Display payload conversion.
//!
//! The engine tags each `eval.display` event with a kind string. This module
//! maps the tag onto [`DisplayKind`] and the content onto a serializable
//! [`MimeBundle`]. Live objects are parked on the [`ValueBus`] and replaced by
//! an HTML snippet telling the renderer which handle to redeem.
//!
//! | Engine tag            | Kind                | Bundle                         |
//! |-----------------------|---------------------|--------------------------------|
//! | `html`                | `Html`              | `text/html`                    |
//! | `sympy`               | `MathMarkup`        | `text/latex`                   |
//! | `turtle`              | `VectorGraphicRoot` | sized node markup, `text/html` |
//! | `matplotlib`, `p5`    | `LiveObject`        | bus mount snippet, `text/html` |
//! | `multiple`            | `MultiPart`         | forwarded as-is                |
//! | `tutor`               | `RichText`          | `text/html`                    |

use std::str::FromStr;
use std::sync::Arc;

use hashi_types::MimeBundle;

use crate::config::DisplayConfig;
use crate::engine::{DisplayContent, LiveNode};
use crate::value_bus::{Handle, ValueBus};

/// Display variants understood by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr)]
pub enum DisplayKind {
    #[strum(serialize = "html")]
    Html,
    #[strum(serialize = "sympy")]
    MathMarkup,
    #[strum(serialize = "turtle")]
    VectorGraphicRoot,
    #[strum(serialize = "matplotlib", serialize = "p5")]
    LiveObject,
    #[strum(serialize = "multiple")]
    MultiPart,
    #[strum(serialize = "tutor")]
    RichText,
}

/// Why a display event produced no payload.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("unrecognized display_type: {0}")]
    UnknownKind(String),
    #[error("display_type {kind} cannot carry {shape} content")]
    ContentMismatch { kind: String, shape: &'static str },
}

/// Converts engine display events into MIME bundles.
#[derive(Debug, Clone)]
pub struct DisplayConverter {
    config: DisplayConfig,
    bus: Arc<ValueBus<LiveNode>>,
}

impl DisplayConverter {
    pub fn new(config: DisplayConfig, bus: Arc<ValueBus<LiveNode>>) -> Self {
        Self { config, bus }
    }

    /// The bus live objects are parked on.
    pub fn bus(&self) -> &Arc<ValueBus<LiveNode>> {
        &self.bus
    }

    /// Convert one display event.
    pub fn convert(
        &self,
        display_type: &str,
        content: DisplayContent,
    ) -> Result<MimeBundle, DisplayError> {
        let kind = DisplayKind::from_str(display_type)
            .map_err(|_| DisplayError::UnknownKind(display_type.to_string()))?;
        let mismatch = |content: &DisplayContent| DisplayError::ContentMismatch {
            kind: display_type.to_string(),
            shape: content.shape(),
        };

        match kind {
            DisplayKind::Html | DisplayKind::RichText => match content {
                DisplayContent::Text(html) => Ok(MimeBundle::html(html)),
                DisplayContent::Node(node) => Ok(MimeBundle::html(node.outer_html())),
                other => Err(mismatch(&other)),
            },
            DisplayKind::MathMarkup => match content {
                DisplayContent::Text(latex) => Ok(MimeBundle::latex(latex)),
                other => Err(mismatch(&other)),
            },
            DisplayKind::VectorGraphicRoot => match content {
                DisplayContent::Node(mut root) => {
                    root.set_attribute("width", &self.config.graphic_width);
                    root.set_attribute("height", &self.config.graphic_height);
                    Ok(MimeBundle::html(root.outer_html()))
                }
                other => Err(mismatch(&other)),
            },
            DisplayKind::LiveObject => match content {
                DisplayContent::Node(node) => {
                    let handle = self.bus.push(node);
                    tracing::debug!(handle, display_type, "live object parked");
                    Ok(MimeBundle::html(self.mount_snippet(handle)))
                }
                other => Err(mismatch(&other)),
            },
            DisplayKind::MultiPart => match content {
                DisplayContent::Bundle(bundle) => Ok(bundle),
                other => Err(mismatch(&other)),
            },
        }
    }

    /// HTML that, once rendered, redeems `handle` and mounts the value.
    pub fn mount_snippet(&self, handle: Handle) -> String {
        let dom_id = format!("{}{}", self.config.output_id_prefix, handle);
        format!(
            "<div id=\"{dom_id}\"></div><script>document.getElementById(\"{dom_id}\").append(window.{bus}.pop({handle}));</script>",
            bus = self.config.bus_global,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StaticNode;
    use serde_json::json;

    fn converter() -> DisplayConverter {
        DisplayConverter::new(DisplayConfig::default(), Arc::new(ValueBus::new()))
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!("html".parse::<DisplayKind>().unwrap(), DisplayKind::Html);
        assert_eq!("matplotlib".parse::<DisplayKind>().unwrap(), DisplayKind::LiveObject);
        assert_eq!("p5".parse::<DisplayKind>().unwrap(), DisplayKind::LiveObject);
        assert_eq!("sympy".parse::<DisplayKind>().unwrap(), DisplayKind::MathMarkup);
        assert!("bokeh".parse::<DisplayKind>().is_err());
    }

    #[test]
    fn test_html_and_rich_text() {
        let c = converter();
        let bundle = c.convert("html", DisplayContent::Text("<b>hi</b>".into())).unwrap();
        assert_eq!(bundle.get_str("text/html"), Some("<b>hi</b>"));

        let bundle = c.convert("tutor", DisplayContent::Text("<table/>".into())).unwrap();
        assert_eq!(bundle.get_str("text/html"), Some("<table/>"));
    }

    #[test]
    fn test_math_markup() {
        let bundle = converter()
            .convert("sympy", DisplayContent::Text("$x^2$".into()))
            .unwrap();
        assert_eq!(bundle.get_str("text/latex"), Some("$x^2$"));
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn test_vector_graphic_root_is_sized() {
        let root = StaticNode::new("svg").with_inner("<line/>");
        let bundle = converter()
            .convert("turtle", DisplayContent::Node(Box::new(root)))
            .unwrap();
        assert_eq!(
            bundle.get_str("text/html"),
            Some("<svg width=\"480px\" height=\"360px\"><line/></svg>")
        );
    }

    #[test]
    fn test_live_object_goes_through_bus() {
        let c = converter();
        let node = StaticNode::new("canvas");
        let bundle = c
            .convert("matplotlib", DisplayContent::Node(Box::new(node)))
            .unwrap();

        assert_eq!(
            bundle.get_str("text/html"),
            Some(
                "<div id=\"hashi-output-1\"></div><script>document.getElementById(\"hashi-output-1\").append(window.valueBus.pop(1));</script>"
            )
        );

        let parked = c.bus().pop(1).expect("node parked under handle 1");
        assert_eq!(parked.outer_html(), "<canvas></canvas>");
        assert!(c.bus().pop(1).is_none());
    }

    #[test]
    fn test_multi_part_forwarded() {
        let mut parts = MimeBundle::plain("x");
        parts.insert("image/png", json!("iVBORw0KGgo="));
        let bundle = converter()
            .convert("multiple", DisplayContent::Bundle(parts.clone()))
            .unwrap();
        assert_eq!(bundle, parts);
    }

    #[test]
    fn test_unknown_kind() {
        let err = converter()
            .convert("bokeh", DisplayContent::Text("?".into()))
            .unwrap_err();
        assert!(matches!(err, DisplayError::UnknownKind(tag) if tag == "bokeh"));
    }

    #[test]
    fn test_content_mismatch() {
        let err = converter()
            .convert("multiple", DisplayContent::Text("not a bundle".into()))
            .unwrap_err();
        assert!(matches!(err, DisplayError::ContentMismatch { shape: "text", .. }));

        let c = converter();
        let err = c
            .convert("p5", DisplayContent::Text("<canvas/>".into()))
            .unwrap_err();
        assert!(matches!(err, DisplayError::ContentMismatch { .. }));
        assert!(c.bus().is_empty());
    }
}
