//! Per-tag host capability table.
//!
//! Certain properties must be seeded through the attribute path on the first
//! write and assigned as properties on every later write. Which properties
//! those are depends on the element tag; the table here is a fixed, static
//! lookup keyed by tag.

/// Capabilities of one element tag.
pub struct NodeCaps {
    seeded: &'static [&'static str],
}

impl NodeCaps {
    /// Whether `name` takes the seeded attribute-then-property path on this
    /// tag. `style` is seeded on every tag.
    pub fn is_seeded(&self, name: &str) -> bool {
        name == "style" || self.seeded.contains(&name)
    }
}

static INPUT_CAPS: NodeCaps = NodeCaps {
    seeded: &["value", "checked"],
};
static SELECT_CAPS: NodeCaps = NodeCaps {
    seeded: &["selected"],
};
static TEXTAREA_CAPS: NodeCaps = NodeCaps { seeded: &["value"] };
static DEFAULT_CAPS: NodeCaps = NodeCaps { seeded: &[] };

/// Capability table lookup for an element tag.
pub fn caps_for(tag: &str) -> &'static NodeCaps {
    match tag {
        "input" => &INPUT_CAPS,
        "select" | "option" => &SELECT_CAPS,
        "textarea" => &TEXTAREA_CAPS,
        _ => &DEFAULT_CAPS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_seeds_value_and_checked() {
        let caps = caps_for("input");
        assert!(caps.is_seeded("value"));
        assert!(caps.is_seeded("checked"));
        assert!(!caps.is_seeded("placeholder"));
    }

    #[test]
    fn style_is_seeded_everywhere() {
        assert!(caps_for("div").is_seeded("style"));
        assert!(caps_for("input").is_seeded("style"));
    }

    #[test]
    fn unknown_tags_seed_nothing_else() {
        let caps = caps_for("custom-widget");
        assert!(!caps.is_seeded("value"));
    }
}
