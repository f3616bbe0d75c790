//! Property values and the runtime property tree of a processor.

use crate::network::id::{ProcessorId, PropertyId};
use crate::network::processor::InvalidationLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value held by a property. Composite properties carry no value of their
/// own; their state lives in their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Composite,
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PropertyValue::Composite)
    }

    /// Class identifier a property gets when its descriptor does not set one.
    pub fn class_identifier(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "BoolProperty",
            PropertyValue::Int(_) => "IntProperty",
            PropertyValue::Float(_) => "FloatProperty",
            PropertyValue::String(_) => "StringProperty",
            PropertyValue::Composite => "CompositeProperty",
        }
    }

    /// Whether `other` can be stored in a property currently holding `self`.
    pub fn same_kind(&self, other: &PropertyValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::Composite => "composite",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::String(v) => f.write_str(v),
            PropertyValue::Composite => f.write_str("<composite>"),
        }
    }
}

/// Declaration of a property, returned by `Processor::properties`.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub identifier: String,
    pub display_name: String,
    pub class_identifier: String,
    pub value: PropertyValue,
    /// Level the owner is invalidated with when the value changes.
    pub invalidation_level: InvalidationLevel,
    /// Whether auto-linking may pick this property.
    pub linkable: bool,
    pub children: Vec<PropertyDescriptor>,
}

impl PropertyDescriptor {
    pub fn new(identifier: impl Into<String>, value: PropertyValue) -> Self {
        let identifier = identifier.into();
        Self {
            display_name: identifier.clone(),
            class_identifier: value.class_identifier().to_string(),
            identifier,
            value,
            invalidation_level: InvalidationLevel::InvalidOutput,
            linkable: true,
            children: Vec::new(),
        }
    }

    pub fn bool(identifier: impl Into<String>, value: bool) -> Self {
        Self::new(identifier, PropertyValue::Bool(value))
    }

    pub fn int(identifier: impl Into<String>, value: i64) -> Self {
        Self::new(identifier, PropertyValue::Int(value))
    }

    pub fn float(identifier: impl Into<String>, value: f64) -> Self {
        Self::new(identifier, PropertyValue::Float(value))
    }

    pub fn string(identifier: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(identifier, PropertyValue::String(value.into()))
    }

    pub fn composite(identifier: impl Into<String>, children: Vec<PropertyDescriptor>) -> Self {
        Self {
            children,
            ..Self::new(identifier, PropertyValue::Composite)
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Override the class identifier used for converter lookup and auto-linking.
    pub fn with_class_identifier(mut self, class: impl Into<String>) -> Self {
        self.class_identifier = class.into();
        self
    }

    pub fn invalidates(mut self, level: InvalidationLevel) -> Self {
        self.invalidation_level = level;
        self
    }

    pub fn not_linkable(mut self) -> Self {
        self.linkable = false;
        self
    }

    /// Number of properties in this subtree, itself included.
    pub fn tree_size(&self) -> usize {
        1 + self.children.iter().map(Self::tree_size).sum::<usize>()
    }
}

/// Runtime property, stored flat per processor. Tree structure is kept via
/// `parent`/`children` handles.
#[derive(Debug, Clone)]
pub struct Property {
    id: PropertyId,
    identifier: String,
    display_name: String,
    class_identifier: String,
    value: PropertyValue,
    invalidation_level: InvalidationLevel,
    linkable: bool,
    parent: Option<PropertyId>,
    children: Vec<PropertyId>,
    revision: u64,
}

impl Property {
    /// Flatten a descriptor tree into `out`, depth first. Returns the id of
    /// the descriptor's root property.
    pub(crate) fn flatten(
        owner: ProcessorId,
        descriptor: PropertyDescriptor,
        parent: Option<PropertyId>,
        out: &mut Vec<Property>,
    ) -> PropertyId {
        let id = PropertyId::new(owner, out.len() as u16);
        out.push(Property {
            id,
            identifier: descriptor.identifier,
            display_name: descriptor.display_name,
            class_identifier: descriptor.class_identifier,
            value: descriptor.value,
            invalidation_level: descriptor.invalidation_level,
            linkable: descriptor.linkable,
            parent,
            children: Vec::new(),
            revision: 0,
        });
        let slot = out.len() - 1;
        for child in descriptor.children {
            let child_id = Self::flatten(owner, child, Some(id), out);
            out[slot].children.push(child_id);
        }
        id
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn owner(&self) -> ProcessorId {
        self.id.processor()
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn class_identifier(&self) -> &str {
        &self.class_identifier
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.invalidation_level
    }

    pub fn is_linkable(&self) -> bool {
        self.linkable
    }

    pub fn is_composite(&self) -> bool {
        self.value.is_composite()
    }

    pub fn parent(&self) -> Option<PropertyId> {
        self.parent
    }

    pub fn children(&self) -> &[PropertyId] {
        &self.children
    }

    /// Number of times the value has actually changed.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Store `value`. Returns `true` if the stored value changed.
    pub(crate) fn set_value(&mut self, value: PropertyValue) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.revision += 1;
        true
    }
}
