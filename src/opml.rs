//! Overcast OPML export parsing.
//!
//! Every element with `type="rss"` is a podcast; its direct `outline`
//! children are episodes. Attributes are kept verbatim so the aggregator
//! decides what it needs.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::PalError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEpisode {
    pub attrs: HashMap<String, String>,
}

impl RawEpisode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str, PalError> {
        self.attr(key)
            .ok_or_else(|| PalError::ParseError(format!("episode is missing '{}' attribute", key)))
    }

    pub fn title(&self) -> &str {
        self.attr("title").unwrap_or_default()
    }

    pub fn overcast_url(&self) -> Option<&str> {
        self.attr("overcastUrl")
    }

    pub fn is_played(&self) -> bool {
        self.attr("played") == Some("1")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPodcast {
    pub attrs: HashMap<String, String>,
    pub episodes: Vec<RawEpisode>,
}

impl RawPodcast {
    pub fn title(&self) -> &str {
        self.attrs.get("title").or_else(|| self.attrs.get("text")).map(String::as_str).unwrap_or_default()
    }

    pub fn category(&self) -> Option<&str> {
        self.attrs.get("category").map(String::as_str).filter(|c| !c.is_empty())
    }
}

fn read_attrs(element: &BytesStart<'_>) -> Result<HashMap<String, String>, PalError> {
    let mut attrs = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

pub fn parse_opml(content: &str) -> Result<Vec<RawPodcast>, PalError> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut podcasts = Vec::new();
    // Podcast currently open, with the depth of its element
    let mut current: Option<(usize, RawPodcast)> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        let (element, is_empty) = match reader.read_event()? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                if matches!(&current, Some((d, _)) if *d == depth) {
                    if let Some((_, podcast)) = current.take() {
                        podcasts.push(podcast);
                    }
                }
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let element_depth = depth + 1;
        if !is_empty {
            depth = element_depth;
        }
        if element.name().as_ref() == b"opml" {
            saw_root = true;
            continue;
        }

        let attrs = read_attrs(&element)?;
        if attrs.get("type").map(String::as_str) == Some("rss") {
            let podcast = RawPodcast { attrs, episodes: Vec::new() };
            if is_empty {
                podcasts.push(podcast);
            } else {
                current = Some((element_depth, podcast));
            }
        } else if let Some((podcast_depth, podcast)) = current.as_mut() {
            if element.name().as_ref() == b"outline" && element_depth == *podcast_depth + 1 {
                podcast.episodes.push(RawEpisode { attrs });
            }
        }
    }

    if !saw_root {
        return Err(PalError::ParseError("Failed to parse OPML: no <opml> root element".to_string()));
    }
    if depth != 0 {
        return Err(PalError::ParseError("Failed to parse OPML: unexpected end of document".to_string()));
    }
    Ok(podcasts)
}
