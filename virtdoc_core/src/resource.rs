use crate::codec::DocumentCodec;
use crate::comparator::SemanticComparator;
use crate::units::UnitTable;
use serde::Serialize;
use tracing::{debug, info, warn};
use virtdoc_common::{AppConfig, ChangeReport, Node, ResourceKind, VirtDocError};

/// A decoded resource definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedResource {
    pub root_tag: String,
    /// `None` when the root tag is not a known resource kind
    pub kind: Option<ResourceKind>,
    pub node: Node,
}

/// Decides whether a desired definition differs from what the platform reports
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    codec: DocumentCodec,
    comparator: SemanticComparator,
}

impl ChangeDetector {
    pub fn new(codec: DocumentCodec, comparator: SemanticComparator) -> Self {
        Self { codec, comparator }
    }

    /// Builds the unit table and output settings from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, VirtDocError> {
        let units = UnitTable::from_config(config)?;
        Ok(Self::new(
            DocumentCodec::new().with_indent(config.indent),
            SemanticComparator::new(units),
        ))
    }

    pub fn codec(&self) -> &DocumentCodec {
        &self.codec
    }

    pub fn comparator(&self) -> &SemanticComparator {
        &self.comparator
    }

    /// Document text for a desired definition, rooted at the kind's element
    pub fn encode_resource(&self, kind: ResourceKind, desired: &Node) -> Result<String, VirtDocError> {
        self.codec.encode(desired, kind.label())
    }

    pub fn decode_resource(&self, text: &str) -> Result<DecodedResource, VirtDocError> {
        let (root_tag, node) = self.codec.decode_element(text)?;
        let kind = ResourceKind::from_root_tag(&root_tag);
        if kind.is_none() {
            warn!("Unknown resource root element <{}>", root_tag);
        }
        Ok(DecodedResource {
            root_tag,
            kind,
            node,
        })
    }

    /// Compare a desired tree with the platform's current document for the same resource
    pub fn has_changed(
        &self,
        kind: ResourceKind,
        desired: &Node,
        observed_xml: &str,
    ) -> Result<ChangeReport, VirtDocError> {
        let observed = self.decode_resource(observed_xml)?;
        if observed.root_tag != kind.label() {
            warn!(
                "Comparing a {} definition against a <{}> document",
                kind, observed.root_tag
            );
        }

        let (equal, path, cause) = self
            .comparator
            .compare(desired, &observed.node, kind.label())?
            .into_parts();

        if equal {
            debug!("{} definition is unchanged", kind);
        } else {
            info!(
                "{} definition changed at {}: {}",
                kind,
                path.as_deref().unwrap_or(kind.label()),
                cause.as_deref().unwrap_or_default()
            );
        }

        Ok(ChangeReport {
            kind,
            changed: !equal,
            path,
            cause,
        })
    }
}
