//! Semantic equality between a desired and an observed canonical tree.
//!
//! Composites compare as unordered sets of members, sequences compare
//! positionally, and everything else compares by its string form. Size
//! quantities (a composite with a `unit` attribute) under a label registered
//! in the [`UnitTable`] are converted to bytes before comparison.
//!
//! The comparison stops at the first divergence found depth-first. Within a
//! composite, attributes are checked first, then inline text, then children
//! in the desired tree's order.
//!
//! A few shapes are equivalent because they encode to the same document:
//! a `false` flag or an empty sequence is an absent member, a composite
//! without attributes or present children compares as a scalar of its text,
//! a `true` flag as an empty scalar, and a one-element sequence as a single
//! child (but as a sequence against another sequence).

use crate::units::{to_bytes, UnitTable, BYTE_UNIT};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;
use virtdoc_common::{Composite, Node, OneOrMany, VirtDocError, ATTRIBUTE_MARKER, TEXT_FIELD};

/// Attribute carrying the unit of a size quantity
pub const UNIT_ATTRIBUTE: &str = "unit";

/// Why two trees were found unequal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DivergenceCause {
    /// Only one side of a size quantity carries a unit
    MissingUnitAttribute,
    MemberCountDiffer,
    MemberNamesDiffer,
    ElementCountDiffer,
    ValuesDiffer { desired: String, observed: String },
}

impl fmt::Display for DivergenceCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivergenceCause::MissingUnitAttribute => f.write_str("missing unit attribute"),
            DivergenceCause::MemberCountDiffer => f.write_str("member count differ"),
            DivergenceCause::MemberNamesDiffer => f.write_str("member names differ"),
            DivergenceCause::ElementCountDiffer => f.write_str("element count differ"),
            DivergenceCause::ValuesDiffer { desired, observed } => {
                write!(f, "values differ {} != {}", desired, observed)
            }
        }
    }
}

/// First point where two trees differ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Dotted location, e.g. `domain.devices.disk.1.source`
    pub path: String,
    pub cause: DivergenceCause,
}

/// Result of a comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub divergence: Option<Divergence>,
}

impl Comparison {
    pub fn equal() -> Self {
        Self { divergence: None }
    }

    pub fn is_equal(&self) -> bool {
        self.divergence.is_none()
    }

    pub fn path(&self) -> Option<&str> {
        self.divergence.as_ref().map(|d| d.path.as_str())
    }

    pub fn cause(&self) -> Option<&DivergenceCause> {
        self.divergence.as_ref().map(|d| &d.cause)
    }

    /// `(equal, divergence path, cause)`
    pub fn into_parts(self) -> (bool, Option<String>, Option<String>) {
        match self.divergence {
            None => (true, None, None),
            Some(Divergence { path, cause }) => (false, Some(path), Some(cause.to_string())),
        }
    }
}

/// Comparator holding the unit table used for size normalization
#[derive(Debug, Clone, Default)]
pub struct SemanticComparator {
    units: UnitTable,
}

impl SemanticComparator {
    pub fn new(units: UnitTable) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &UnitTable {
        &self.units
    }

    /// Compare `desired` against `observed`; `path` labels the root of both
    /// trees and selects the unit table entry.
    ///
    /// Fails only when a size quantity cannot be normalized (unknown unit,
    /// non-integer magnitude).
    pub fn compare(&self, desired: &Node, observed: &Node, path: &str) -> Result<Comparison, VirtDocError> {
        let mut walk = Walk {
            units: &self.units,
            label: path,
            path: vec![path.to_string()],
        };

        let divergence = walk.nodes(desired, observed)?;
        if let Some(divergence) = &divergence {
            debug!("Trees diverge at {}: {}", divergence.path, divergence.cause);
        }
        Ok(Comparison { divergence })
    }
}

/// Compare with the built-in unit table
pub fn compare(desired: &Node, observed: &Node, path: &str) -> Result<Comparison, VirtDocError> {
    SemanticComparator::default().compare(desired, observed, path)
}

/// How a node takes part in a comparison
enum Shape<'a> {
    Text(&'a str),
    Composite(&'a Composite),
}

fn shape(node: &Node) -> Shape<'_> {
    match node {
        Node::Scalar(text) => Shape::Text(text),
        Node::Flag(true) => Shape::Text(""),
        Node::Flag(false) => Shape::Text("false"),
        Node::Composite(c)
            if c.attributes.is_empty() && c.children.values().all(|v| member(v).is_none()) =>
        {
            Shape::Text(c.text.as_deref().unwrap_or(""))
        }
        Node::Composite(c) => Shape::Composite(c),
    }
}

/// A child member after dropping what encodes to nothing
enum Member<'a> {
    Single(&'a Node),
    Sequence(Vec<&'a Node>),
}

fn member(value: &OneOrMany<Node>) -> Option<Member<'_>> {
    let mut items: Vec<&Node> = value.iter().filter(|n| !matches!(n, Node::Flag(false))).collect();
    match (value, items.len()) {
        (_, 0) => None,
        (OneOrMany::One(_), _) => items.pop().map(Member::Single),
        (OneOrMany::Many(_), _) => Some(Member::Sequence(items)),
    }
}

fn member_names(composite: &Composite) -> BTreeSet<String> {
    let attributes = composite
        .attributes
        .keys()
        .map(|name| format!("{}{}", ATTRIBUTE_MARKER, name));
    let text = composite.text.iter().map(|_| TEXT_FIELD.to_string());
    let children = composite
        .children
        .iter()
        .filter(|(_, value)| member(value).is_some())
        .map(|(tag, _)| tag.clone());
    attributes.chain(text).chain(children).collect()
}

fn display_member(member: &Member<'_>) -> String {
    match member {
        Member::Single(node) => node.to_string(),
        Member::Sequence(items) => {
            let items: Vec<String> = items.iter().map(|node| node.to_string()).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

struct Walk<'a> {
    units: &'a UnitTable,
    label: &'a str,
    path: Vec<String>,
}

impl Walk<'_> {
    fn diverge(&self, cause: DivergenceCause) -> Option<Divergence> {
        Some(Divergence {
            path: self.path.join("."),
            cause,
        })
    }

    fn values_differ(&self, desired: impl fmt::Display, observed: impl fmt::Display) -> Option<Divergence> {
        self.diverge(DivergenceCause::ValuesDiffer {
            desired: desired.to_string(),
            observed: observed.to_string(),
        })
    }

    fn nested<F>(&mut self, segment: String, f: F) -> Result<Option<Divergence>, VirtDocError>
    where
        F: FnOnce(&mut Self) -> Result<Option<Divergence>, VirtDocError>,
    {
        self.path.push(segment);
        let result = f(self);
        self.path.pop();
        result
    }

    fn is_quantity(&self, composite: &Composite) -> bool {
        composite.attributes.contains_key(UNIT_ATTRIBUTE) && self.units.contains(self.label)
    }

    fn nodes(&mut self, desired: &Node, observed: &Node) -> Result<Option<Divergence>, VirtDocError> {
        match (shape(desired), shape(observed)) {
            (Shape::Composite(d), Shape::Composite(o)) => self.composites(d, o),
            (Shape::Text(d), Shape::Text(o)) if d == o => Ok(None),
            (Shape::Text(d), Shape::Text(o)) => Ok(self.values_differ(d, o)),
            (Shape::Composite(c), _) | (_, Shape::Composite(c)) if self.is_quantity(c) => {
                Ok(self.diverge(DivergenceCause::MissingUnitAttribute))
            }
            _ => Ok(self.values_differ(desired, observed)),
        }
    }

    fn composites(&mut self, desired: &Composite, observed: &Composite) -> Result<Option<Divergence>, VirtDocError> {
        let (desired, observed) = match (self.is_quantity(desired), self.is_quantity(observed)) {
            (true, true) => (
                Cow::Owned(self.normalize(desired)?),
                Cow::Owned(self.normalize(observed)?),
            ),
            (false, false) => (Cow::Borrowed(desired), Cow::Borrowed(observed)),
            _ => return Ok(self.diverge(DivergenceCause::MissingUnitAttribute)),
        };

        let desired_names = member_names(&desired);
        let observed_names = member_names(&observed);
        if desired_names.len() != observed_names.len() {
            return Ok(self.diverge(DivergenceCause::MemberCountDiffer));
        }
        if desired_names != observed_names {
            return Ok(self.diverge(DivergenceCause::MemberNamesDiffer));
        }

        for (name, value) in &desired.attributes {
            let other = observed.attributes.get(name).map(String::as_str).unwrap_or_default();
            if value != other {
                let segment = format!("{}{}", ATTRIBUTE_MARKER, name);
                return self.nested(segment, |walk| Ok(walk.values_differ(value, other)));
            }
        }

        if let (Some(d), Some(o)) = (&desired.text, &observed.text) {
            if d != o {
                return self.nested(TEXT_FIELD.to_string(), |walk| Ok(walk.values_differ(d, o)));
            }
        }

        for (tag, value) in &desired.children {
            let Some(d) = member(value) else { continue };
            let Some(o) = observed.children.get(tag).and_then(member) else { continue };
            let divergence = self.nested(tag.clone(), |walk| walk.members(&d, &o))?;
            if divergence.is_some() {
                return Ok(divergence);
            }
        }

        Ok(None)
    }

    fn members(&mut self, desired: &Member<'_>, observed: &Member<'_>) -> Result<Option<Divergence>, VirtDocError> {
        match (desired, observed) {
            (Member::Single(d), Member::Single(o)) => self.nodes(d, o),
            // A lone element decodes as a single child
            (Member::Sequence(d), Member::Single(o)) if d.len() == 1 => self.nodes(d[0], o),
            (Member::Single(d), Member::Sequence(o)) if o.len() == 1 => self.nodes(d, o[0]),
            (Member::Sequence(d), Member::Sequence(o)) => {
                if d.len() != o.len() {
                    return Ok(self.diverge(DivergenceCause::ElementCountDiffer));
                }
                for (index, (d, o)) in d.iter().zip(o.iter()).enumerate() {
                    let divergence = self.nested(index.to_string(), |walk| walk.nodes(d, o))?;
                    if divergence.is_some() {
                        return Ok(divergence);
                    }
                }
                Ok(None)
            }
            _ => Ok(self.values_differ(display_member(desired), display_member(observed))),
        }
    }

    /// Copy of a size quantity rewritten to its byte count and the byte unit
    fn normalize(&self, quantity: &Composite) -> Result<Composite, VirtDocError> {
        let raw = quantity.text.as_deref().unwrap_or_default();
        let magnitude: u64 = raw.trim().parse().map_err(|_| VirtDocError::InvalidMagnitude {
            value: raw.to_string(),
        })?;

        let unit = match quantity.attribute(UNIT_ATTRIBUTE) {
            Some(unit) if !unit.is_empty() => unit,
            _ => self.units.default_unit(self.label).unwrap_or(BYTE_UNIT),
        };
        let bytes = to_bytes(magnitude, unit)?;
        debug!("Normalized {} {} to {} bytes at {}", magnitude, unit, bytes, self.path.join("."));

        let mut normalized = quantity.clone();
        normalized.text = Some(bytes.to_string());
        normalized.attributes.insert(UNIT_ATTRIBUTE.to_string(), BYTE_UNIT.to_string());
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;

    fn quantity(unit: &str, value: impl ToString) -> Node {
        Composite::new()
            .with_attribute("unit", unit)
            .with_text(value.to_string())
            .into()
    }

    fn wrap(tag: &str, node: Node) -> Node {
        Composite::new().with_child(tag, node).into()
    }

    fn equal(desired: &Node, observed: &Node) -> bool {
        compare(desired, observed, "domain").unwrap().is_equal()
    }

    #[test]
    fn test_scalars() {
        assert!(equal(&Node::from("a"), &Node::from("a")));
        assert!(equal(&Node::from(1), &Node::from("1")));
        assert!(equal(&Node::from(true), &Node::from(true)));
        assert!(!equal(&Node::from("1.0"), &Node::from("1")));

        let result = compare(&Node::from("a"), &Node::from("b"), "domain").unwrap();
        assert_eq!(
            result.into_parts(),
            (false, Some("domain".to_string()), Some("values differ a != b".to_string()))
        );
    }

    #[test]
    fn test_composites_ignore_member_order() {
        let a: Node = Composite::new().with_child("a", 1).with_child("b", 2).into();
        let b: Node = Composite::new().with_child("b", 2).with_child("a", 1).into();
        assert!(equal(&a, &b));
    }

    #[test]
    fn test_sequences_are_ordered() {
        let a: Node = Composite::new().with_children("x", vec![1, 2]).into();
        let b: Node = Composite::new().with_children("x", vec![2, 1]).into();

        let result = compare(&a, &b, "domain").unwrap();
        assert_eq!(result.path(), Some("domain.x.0"));
        assert_eq!(result.cause().unwrap().to_string(), "values differ 1 != 2");
    }

    #[test]
    fn test_element_count() {
        let a: Node = Composite::new().with_children("x", vec![1, 2, 3]).into();
        let b: Node = Composite::new().with_children("x", vec![1, 2]).into();

        let result = compare(&a, &b, "domain").unwrap();
        assert_eq!(result.path(), Some("domain.x"));
        assert_eq!(result.cause(), Some(&DivergenceCause::ElementCountDiffer));
    }

    #[test]
    fn test_member_count_and_names() {
        let a: Node = Composite::new().with_child("a", 1).into();
        let b: Node = Composite::new().with_child("a", 1).with_child("b", 2).into();
        let result = compare(&wrap("os", a.clone()), &wrap("os", b), "domain").unwrap();
        assert_eq!(result.path(), Some("domain.os"));
        assert_eq!(result.cause(), Some(&DivergenceCause::MemberCountDiffer));

        let c: Node = Composite::new().with_child("c", 1).into();
        let result = compare(&a, &c, "domain").unwrap();
        assert_eq!(result.path(), Some("domain"));
        assert_eq!(result.cause(), Some(&DivergenceCause::MemberNamesDiffer));
    }

    #[test]
    fn test_attribute_mismatch_path() {
        let a: Node = Composite::new().with_attribute("type", "kvm").with_child("name", "x").into();
        let b: Node = Composite::new().with_attribute("type", "qemu").with_child("name", "x").into();

        let result = compare(&a, &b, "domain").unwrap();
        assert_eq!(result.path(), Some("domain._type"));
        assert_eq!(result.cause().unwrap().to_string(), "values differ kvm != qemu");
    }

    #[test]
    fn test_nested_sequence_path() {
        let disk = |file: &str| -> Node {
            Composite::new()
                .with_attribute("device", "disk")
                .with_child("source", Composite::new().with_attribute("file", file))
                .into()
        };
        let desired = wrap(
            "devices",
            Composite::new().with_children("disk", vec![disk("a.img"), disk("b.img")]).into(),
        );
        let observed = wrap(
            "devices",
            Composite::new().with_children("disk", vec![disk("a.img"), disk("c.img")]).into(),
        );

        let result = compare(&desired, &observed, "domain").unwrap();
        assert_eq!(result.path(), Some("domain.devices.disk.1.source._file"));
    }

    #[test]
    fn test_unit_aware_equality() {
        assert!(equal(&wrap("a", quantity("KB", 1)), &wrap("a", quantity("b", 1000))));
        assert!(equal(&wrap("a", quantity("KiB", 1)), &wrap("a", quantity("b", 1024))));
        assert!(equal(&wrap("a", quantity("KiB", 1024)), &wrap("a", quantity("MiB", 1))));
        assert!(equal(&quantity("KB", 1), &quantity("b", 1000)));
        assert!(!equal(&quantity("KB", 1), &quantity("KiB", 1)));
    }

    #[test]
    fn test_empty_unit_uses_table_default() {
        assert!(equal(&quantity("", 1), &quantity("KiB", 1)));

        let result = compare(&quantity("", 1), &quantity("bytes", 1), "volume").unwrap();
        assert!(result.is_equal());
    }

    #[test]
    fn test_units_only_normalized_under_registered_labels() {
        let result = compare(&quantity("KB", 1), &quantity("b", 1000), "network").unwrap();
        assert_eq!(result.path(), Some("network._unit"));
    }

    #[test]
    fn test_missing_unit_attribute() {
        let bare: Node = Composite::new().with_attribute("slot", "0").with_text("1024").into();
        let result = compare(&quantity("KiB", 1024), &bare, "domain").unwrap();
        assert_eq!(result.cause(), Some(&DivergenceCause::MissingUnitAttribute));

        let result = compare(&wrap("memory", quantity("KiB", 1024)), &wrap("memory", "1024".into()), "domain")
            .unwrap();
        assert_eq!(result.path(), Some("domain.memory"));
        assert_eq!(result.cause().unwrap().to_string(), "missing unit attribute");
    }

    #[test]
    fn test_unit_errors_propagate() {
        let err = compare(&quantity("KxB", 1), &quantity("b", 1), "domain").unwrap_err();
        assert!(matches!(err, VirtDocError::InvalidUnit { unit } if unit == "KxB"));

        let err = compare(&quantity("KiB", "lots"), &quantity("b", 1), "domain").unwrap_err();
        assert!(matches!(err, VirtDocError::InvalidMagnitude { .. }));
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let desired = wrap("memory", quantity("GiB", 1));
        let observed = wrap("memory", quantity("MiB", 1024));
        let before = (desired.clone(), observed.clone());

        assert!(equal(&desired, &observed));
        assert_eq!((desired, observed), before);
    }

    #[test]
    fn test_encoding_equivalences() {
        let flagged: Node = Composite::new()
            .with_child("acpi", true)
            .with_child("pae", false)
            .with_children("disk", vec!["a"])
            .with_children("hostdev", Vec::<Node>::new())
            .into();
        let decoded: Node = Composite::new()
            .with_child("acpi", Composite::new())
            .with_child("disk", "a")
            .into();
        assert!(equal(&flagged, &decoded));

        let text_only: Node = Composite::new().with_text("x").into();
        assert!(equal(&text_only, &Node::from("x")));

        let emptied: Node = Composite::new()
            .with_child("devices", Composite::new().with_children("hostdev", Vec::<Node>::new()))
            .with_child("features", Composite::new().with_child("pae", false))
            .with_child("name", "x")
            .into();
        let decoded: Node = Composite::new()
            .with_child("devices", Composite::new())
            .with_child("features", Composite::new())
            .with_child("name", "x")
            .into();
        assert!(equal(&emptied, &decoded));
    }

    #[test]
    fn test_short_sequence_reports_element_count() {
        let desired: Node = Composite::new().with_children("disk", vec!["a"]).into();
        let observed = decode("<domain><disk>a</disk><disk>b</disk></domain>").unwrap();

        let result = compare(&desired, &observed, "domain").unwrap();
        assert_eq!(result.path(), Some("domain.disk"));
        assert_eq!(result.cause(), Some(&DivergenceCause::ElementCountDiffer));

        let result = compare(&observed, &desired, "domain").unwrap();
        assert_eq!(result.cause(), Some(&DivergenceCause::ElementCountDiffer));
    }

    #[test]
    fn test_attributes_checked_before_children() {
        let desired: Node = Composite::new().with_child("name", "a").with_attribute("type", "kvm").into();
        let observed: Node = Composite::new().with_child("name", "b").with_attribute("type", "qemu").into();

        let result = compare(&desired, &observed, "domain").unwrap();
        assert_eq!(result.path(), Some("domain._type"));
    }

    #[test]
    fn test_decoded_scenario() {
        let desired: Node = Composite::new()
            .with_child("name", "web")
            .with_child("memory", quantity("GiB", "1"))
            .into();
        let observed =
            decode(r#"<domain><name>web</name><memory unit="MiB">1024</memory></domain>"#).unwrap();

        assert!(compare(&desired, &observed, "domain").unwrap().is_equal());
    }

    #[test]
    fn test_custom_unit_table() {
        let units = UnitTable::empty().with_default_unit("pool", "bytes").unwrap();
        let comparator = SemanticComparator::new(units);

        let result = comparator.compare(&quantity("KiB", 1), &quantity("b", 1024), "pool").unwrap();
        assert!(result.is_equal());

        let result = comparator.compare(&quantity("KiB", 1), &quantity("b", 1024), "domain").unwrap();
        assert!(!result.is_equal());
    }
}
