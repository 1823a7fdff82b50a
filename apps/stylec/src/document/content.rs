//! Resume content blocks and the style each one is rendered with.
//!
//! The same block kind is addressed by a CSS selector in the stylesheets and by a
//! paragraph style name in the document target.

use serde::{Deserialize, Serialize};

use crate::document::model::{DocumentStyleTree, ParagraphStyle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading { text: String },
    BulletList { items: Vec<String> },
    Paragraph { text: String },
    KeyValueGroup { entries: Vec<KeyValue> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Heading,
    BulletList,
    Paragraph,
    KeyValueGroup,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Heading,
        ContentKind::BulletList,
        ContentKind::Paragraph,
        ContentKind::KeyValueGroup,
    ];

    /// Selector of the element that carries the block's box in the stylesheets.
    pub fn selector(self) -> &'static str {
        match self {
            ContentKind::Heading => ".section-title",
            ContentKind::BulletList => ".bullets li",
            ContentKind::Paragraph => ".body-text",
            ContentKind::KeyValueGroup => ".kv-row",
        }
    }

    /// Paragraph style of the block in the document target.
    pub fn style_name(self) -> &'static str {
        match self {
            ContentKind::Heading => "SectionHeading",
            ContentKind::BulletList => "ListBullet",
            ContentKind::Paragraph => "Body",
            ContentKind::KeyValueGroup => "KeyValue",
        }
    }
}

impl ContentBlock {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentBlock::Heading { .. } => ContentKind::Heading,
            ContentBlock::BulletList { .. } => ContentKind::BulletList,
            ContentBlock::Paragraph { .. } => ContentKind::Paragraph,
            ContentBlock::KeyValueGroup { .. } => ContentKind::KeyValueGroup,
        }
    }

    /// One block of every kind, for layout probing.
    pub fn sample() -> Vec<ContentBlock> {
        vec![
            ContentBlock::Heading {
                text: "Experience".into(),
            },
            ContentBlock::BulletList {
                items: vec!["Shipped the thing".into(), "Measured the thing".into()],
            },
            ContentBlock::Paragraph {
                text: "Summary paragraph.".into(),
            },
            ContentBlock::KeyValueGroup {
                entries: vec![KeyValue {
                    key: "Languages".into(),
                    value: "Rust, SQL".into(),
                }],
            },
        ]
    }
}

impl DocumentStyleTree {
    pub fn paragraph_for(&self, block: &ContentBlock) -> Option<&ParagraphStyle> {
        self.paragraphs.get(block.kind().style_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_deserialize_by_type_tag() {
        let json = r#"[
            {"type": "heading", "text": "Skills"},
            {"type": "bullet_list", "items": ["a", "b"]},
            {"type": "key_value_group", "entries": [{"key": "k", "value": "v"}]}
        ]"#;
        let blocks: Vec<ContentBlock> = serde_json::from_str(json).unwrap();
        let kinds: Vec<ContentKind> = blocks.iter().map(ContentBlock::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ContentKind::Heading,
                ContentKind::BulletList,
                ContentKind::KeyValueGroup
            ]
        );
    }

    #[test]
    fn test_sample_covers_every_kind() {
        let kinds: Vec<ContentKind> = ContentBlock::sample().iter().map(|b| b.kind()).collect();
        assert_eq!(kinds, ContentKind::ALL.to_vec());
    }

    #[test]
    fn test_bullets_map_to_list_bullet_style() {
        assert_eq!(ContentKind::BulletList.selector(), ".bullets li");
        assert_eq!(ContentKind::BulletList.style_name(), "ListBullet");
    }
}
