//! Built-in label prompts for each garment attribute.

/// A candidate label and the text prompt used to embed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPrompt {
    pub label: &'static str,
    pub prompt: &'static str,
}

const fn prompt(label: &'static str, prompt: &'static str) -> LabelPrompt {
    LabelPrompt { label, prompt }
}

/// An attribute inferred by zero-shot classification.
///
/// Prompt order is significant: ties between labels resolve to the one listed
/// first.
#[derive(Debug, PartialEq, Eq)]
pub struct AttributeCategory {
    pub id: &'static str,
    pub default_label: &'static str,
    pub prompts: &'static [LabelPrompt],
}

pub static FIT: AttributeCategory = AttributeCategory {
    id: "fit",
    default_label: "regular",
    prompts: &[
        prompt("slim", "a photo of slim fit clothing that hugs the body"),
        prompt("regular", "a photo of regular fit clothing with a classic cut"),
        prompt("loose", "a photo of loose fit clothing with a relaxed silhouette"),
        prompt("oversized", "a photo of oversized clothing that is much too big"),
    ],
};

pub static PATTERN: AttributeCategory = AttributeCategory {
    id: "pattern",
    default_label: "plain",
    prompts: &[
        prompt("plain", "a photo of plain solid colored clothing without pattern"),
        prompt("striped", "a photo of striped clothing"),
        prompt("checked", "a photo of checked or plaid clothing"),
        prompt("floral", "a photo of clothing with a floral print"),
        prompt("dotted", "a photo of polka dot clothing"),
        prompt("graphic", "a photo of clothing with a graphic print or logo"),
    ],
};

static BUILTIN: [&AttributeCategory; 2] = [&FIT, &PATTERN];

impl AttributeCategory {
    /// All categories shipped with the crate.
    pub fn builtin() -> &'static [&'static AttributeCategory] {
        &BUILTIN
    }

    pub fn by_id(id: &str) -> Option<&'static AttributeCategory> {
        BUILTIN.iter().copied().find(|c| c.id.eq_ignore_ascii_case(id))
    }

    pub fn labels(&self) -> impl Iterator<Item = &'static str> {
        self.prompts.iter().map(|p| p.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sets() {
        assert_eq!(FIT.prompts.len(), 4);
        assert_eq!(PATTERN.prompts.len(), 6);
        assert_eq!(AttributeCategory::builtin().len(), 2);
    }

    #[test]
    fn test_defaults_are_members() {
        for category in AttributeCategory::builtin() {
            assert!(
                category.labels().any(|l| l == category.default_label),
                "default '{}' missing from {}",
                category.default_label,
                category.id
            );
        }
    }

    #[test]
    fn test_labels_unique() {
        for category in AttributeCategory::builtin() {
            let mut labels: Vec<_> = category.labels().collect();
            labels.sort();
            labels.dedup();
            assert_eq!(labels.len(), category.prompts.len());
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(AttributeCategory::by_id("FIT"), Some(&FIT));
        assert_eq!(AttributeCategory::by_id("pattern").map(|c| c.default_label), Some("plain"));
        assert!(AttributeCategory::by_id("sleeve").is_none());
    }
}
