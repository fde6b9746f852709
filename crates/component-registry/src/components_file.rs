//! Components file: the list of components a participant loads besides its
//! native ones.
//!
//! ```xml
//! <components>
//!     <component>
//!         <iid>clock.arya.participant.iid</iid>
//!         <source type="plugin">plugins/libclock.so</source>
//!     </component>
//! </components>
//! ```
//!
//! Relative plugin paths resolve against the directory of the file.

use crate::registry::ComponentSource;
use participant_types::{ParticipantError, Result, XmlElement};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescription {
    pub iid: String,
    pub source: ComponentSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentsFile {
    pub components: Vec<ComponentDescription>,
}

impl ComponentsFile {
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ParticipantError::not_found(format!(
                "components file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base_dir)
            .map_err(|e| e.context(format!("components file '{}'", path.display())))
    }

    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let root = XmlElement::parse(text)?;
        if root.name != "components" {
            return Err(ParticipantError::invalid_argument(format!(
                "expected root node 'components', found '{}'",
                root.name
            )));
        }

        let mut components = Vec::new();
        for node in root.children_named("component") {
            let iid = node.required_text("iid")?.to_string();
            let source = node.required_child("source")?;
            let source = match source.attribute("type") {
                Some("native") => ComponentSource::Native,
                Some("plugin") => {
                    let file = source.text.trim();
                    if file.is_empty() {
                        return Err(ParticipantError::invalid_argument(format!(
                            "empty value of node 'source' in component '{}'",
                            iid
                        )));
                    }
                    ComponentSource::Plugin(base_dir.join(file))
                }
                Some(other) => {
                    return Err(ParticipantError::invalid_argument(format!(
                        "unknown source type '{}' for component '{}'",
                        other, iid
                    )))
                }
                None => {
                    return Err(ParticipantError::invalid_argument(format!(
                        "missing attribute 'type' of node 'source' in component '{}'",
                        iid
                    )))
                }
            };
            debug!(%iid, source = source.label(), "[Registry] Component listed");
            components.push(ComponentDescription { iid, source });
        }
        Ok(Self { components })
    }
}
