//! Canonical tree model shared by the codec and the comparator.
//!
//! A document element maps to one [`Node`]:
//!
//! - an element without attributes and children is a [`Node::Scalar`] holding its text
//! - anything else is a [`Node::Composite`] with attributes, optional inline text and
//!   children grouped by tag
//! - [`Node::Flag`] only exists on the encode side: `true` emits an empty element,
//!   `false` emits nothing
//!
//! In the JSON/YAML exchange format attributes are keys prefixed with
//! [`ATTRIBUTE_MARKER`] and inline text is stored under [`TEXT_FIELD`].

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;

/// Prefix marking an attribute field in the exchange format and in diagnostic paths
pub const ATTRIBUTE_MARKER: char = '_';

/// Field name holding an element's own text when it also has attributes or children
pub const TEXT_FIELD: &str = "__value";

/// A node of the canonical tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(String),
    Composite(Composite),
    Flag(bool),
}

/// Element with attributes and/or children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composite {
    pub attributes: IndexMap<String, String>,
    pub text: Option<String>,
    pub children: IndexMap<String, OneOrMany<Node>>,
}

/// Value of a child field: a tag seen once, or a repeated tag in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl Node {
    pub fn scalar(text: impl Into<String>) -> Self {
        Node::Scalar(text.into())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Node::Scalar(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Node::Composite(composite) => Some(composite),
            _ => None,
        }
    }
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Adds a child; a second child with the same tag turns the field into a sequence.
    pub fn with_child(mut self, tag: impl Into<String>, node: impl Into<Node>) -> Self {
        self.push_child(tag, node);
        self
    }

    /// Sets a child field to an explicit sequence, even of length one.
    pub fn with_children<I, N>(mut self, tag: impl Into<String>, nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        let nodes = nodes.into_iter().map(Into::into).collect();
        self.children.insert(tag.into(), OneOrMany::Many(nodes));
        self
    }

    pub fn push_child(&mut self, tag: impl Into<String>, node: impl Into<Node>) {
        let node = node.into();
        match self.children.entry(tag.into()) {
            indexmap::map::Entry::Occupied(mut entry) => entry.get_mut().push(node),
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(OneOrMany::One(node));
            }
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn child(&self, tag: &str) -> Option<&OneOrMany<Node>> {
        self.children.get(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.text.is_none() && self.children.is_empty()
    }
}

impl<T> OneOrMany<T> {
    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }

    pub fn push(&mut self, item: T) {
        let previous = std::mem::replace(self, OneOrMany::Many(Vec::new()));
        let mut items = match previous {
            OneOrMany::One(first) => vec![first],
            OneOrMany::Many(items) => items,
        };
        items.push(item);
        *self = OneOrMany::Many(items);
    }
}

impl From<Composite> for Node {
    fn from(composite: Composite) -> Self {
        Node::Composite(composite)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Scalar(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::Scalar(text)
    }
}

impl From<bool> for Node {
    fn from(flag: bool) -> Self {
        Node::Flag(flag)
    }
}

macro_rules! node_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Node {
                fn from(value: $ty) -> Self {
                    Node::Scalar(value.to_string())
                }
            }
        )*
    };
}

node_from_integer!(i32, i64, u32, u64, usize);

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Scalar(text) => f.write_str(text),
            Node::Flag(flag) => write!(f, "{}", flag),
            Node::Composite(composite) => {
                f.write_str("{")?;
                let mut first = true;
                for (name, value) in &composite.attributes {
                    separator(f, &mut first)?;
                    write!(f, "{}{}: {}", ATTRIBUTE_MARKER, name, value)?;
                }
                if let Some(text) = &composite.text {
                    separator(f, &mut first)?;
                    write!(f, "{}: {}", TEXT_FIELD, text)?;
                }
                for (tag, value) in &composite.children {
                    separator(f, &mut first)?;
                    write!(f, "{}: {}", tag, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn separator(f: &mut fmt::Formatter<'_>, first: &mut bool) -> fmt::Result {
    if std::mem::take(first) {
        Ok(())
    } else {
        f.write_str(", ")
    }
}

impl<T: fmt::Display> fmt::Display for OneOrMany<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OneOrMany::One(item) => item.fmt(f),
            OneOrMany::Many(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Scalar(text) => serializer.serialize_str(text),
            Node::Flag(flag) => serializer.serialize_bool(*flag),
            Node::Composite(composite) => composite.serialize(serializer),
        }
    }
}

impl Serialize for Composite {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.attributes.len() + self.children.len() + usize::from(self.text.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        for (name, value) in &self.attributes {
            map.serialize_entry(&format!("{}{}", ATTRIBUTE_MARKER, name), value)?;
        }
        if let Some(text) = &self.text {
            map.serialize_entry(TEXT_FIELD, text)?;
        }
        for (tag, value) in &self.children {
            map.serialize_entry(tag, value)?;
        }
        map.end()
    }
}

impl<T: Serialize> Serialize for OneOrMany<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OneOrMany::One(item) => item.serialize(serializer),
            OneOrMany::Many(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = Node;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean, null or map")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Node, E> {
        Ok(Node::Flag(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Node, E> {
        Ok(Node::Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Node, E> {
        Ok(Node::Scalar(v))
    }

    // null is an element without content
    fn visit_unit<E: de::Error>(self) -> Result<Node, E> {
        Ok(Node::Composite(Composite::default()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Node, E> {
        self.visit_unit()
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Node, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Node, A::Error> {
        let mut composite = Composite::default();
        while let Some(key) = map.next_key::<String>()? {
            if key == TEXT_FIELD {
                composite.text = Some(map.next_value::<ScalarText>()?.0);
            } else if let Some(name) = key.strip_prefix(ATTRIBUTE_MARKER) {
                let value = map.next_value::<ScalarText>()?.0;
                composite.attributes.insert(name.to_string(), value);
            } else {
                let value = map.next_value::<OneOrMany<Node>>()?;
                composite.children.insert(key, value);
            }
        }
        Ok(Node::Composite(composite))
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct ChildVisitor;

impl<'de> Visitor<'de> for ChildVisitor {
    type Value = OneOrMany<Node>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a child node or a sequence of child nodes")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        NodeVisitor.visit_bool(v).map(OneOrMany::One)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        NodeVisitor.visit_i64(v).map(OneOrMany::One)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        NodeVisitor.visit_u64(v).map(OneOrMany::One)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        NodeVisitor.visit_f64(v).map(OneOrMany::One)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        NodeVisitor.visit_str(v).map(OneOrMany::One)
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        NodeVisitor.visit_string(v).map(OneOrMany::One)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        NodeVisitor.visit_unit().map(OneOrMany::One)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        self.visit_unit()
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        NodeVisitor.visit_map(map).map(OneOrMany::One)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<Node>()? {
            items.push(item);
        }
        Ok(OneOrMany::Many(items))
    }
}

impl<'de> Deserialize<'de> for OneOrMany<Node> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ChildVisitor)
    }
}

/// Attribute or inline text value; any scalar is accepted and stringified.
struct ScalarText(String);

impl<'de> Deserialize<'de> for ScalarText {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarTextVisitor;

        impl<'de> Visitor<'de> for ScalarTextVisitor {
            type Value = ScalarText;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number or boolean")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ScalarText, E> {
                Ok(ScalarText(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<ScalarText, E> {
                Ok(ScalarText(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<ScalarText, E> {
                Ok(ScalarText(String::new()))
            }
        }

        deserializer.deserialize_any(ScalarTextVisitor)
    }
}
