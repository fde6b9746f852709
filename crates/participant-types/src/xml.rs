//! Minimal element tree over `quick-xml`, shared by the components file and
//! the timing configuration reader.
//!
//! Missing or empty required nodes are errors naming the node and its
//! parent, e.g. `missing node 'cycle_time' in 'job'`.

use crate::errors::{ParticipantError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a document and return its root element.
    pub fn parse(document: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(document);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        loop {
            let event = reader.read_event().map_err(|e| {
                malformed(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;
            match event {
                Event::Start(start) => stack.push(open(&start)?),
                Event::Empty(start) => close(open(&start)?, &mut stack, &mut root)?,
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| malformed("unbalanced closing tag"))?;
                    close(element, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    let value = text.unescape().map_err(|e| malformed(e.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&value);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(malformed("unexpected end of document"));
        }
        root.ok_or_else(|| malformed("document has no root element"))
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The child `name`; an error naming it if absent.
    pub fn required_child(&self, name: &str) -> Result<&XmlElement> {
        self.child(name).ok_or_else(|| {
            ParticipantError::invalid_argument(format!(
                "missing node '{}' in '{}'",
                name, self.name
            ))
        })
    }

    /// Trimmed text of the child `name`; an error if absent or empty.
    pub fn required_text(&self, name: &str) -> Result<&str> {
        let text = self.required_child(name)?.text.trim();
        if text.is_empty() {
            return Err(ParticipantError::invalid_argument(format!(
                "empty value of node '{}' in '{}'",
                name, self.name
            )));
        }
        Ok(text)
    }

    /// Trimmed text of the child `name`, or `None` if it is absent or empty.
    #[must_use]
    pub fn optional_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|child| child.text.trim())
            .filter(|text| !text.is_empty())
    }
}

fn open(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..XmlElement::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| malformed(e.to_string()))?;
        let value = attribute
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?;
        element.attributes.push((
            String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(element)
}

fn close(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(malformed("more than one root element")),
    }
    Ok(())
}

fn malformed(detail: impl std::fmt::Display) -> ParticipantError {
    ParticipantError::invalid_argument(format!("malformed xml: {}", detail))
}
