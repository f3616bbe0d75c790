//! Property type conversion registry.
//!
//! Links move values between properties that may hold different types. The
//! registry maps a (source class, destination class) pair to a converter;
//! the link evaluator only ever asks it whether a pair converts and for the
//! handle doing so.

use crate::network::property::PropertyValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts a source property value into a value for a destination property.
pub trait PropertyConverter: Send + Sync {
    /// Returns `None` when this particular value cannot be represented.
    fn convert(&self, value: &PropertyValue) -> Option<PropertyValue>;

    fn name(&self) -> &str {
        "converter"
    }
}

pub type ConverterHandle = Arc<dyn PropertyConverter>;

/// Passes values through unchanged. Used for same-class links.
#[derive(Debug, Default)]
pub struct IdentityConverter;

impl PropertyConverter for IdentityConverter {
    fn convert(&self, value: &PropertyValue) -> Option<PropertyValue> {
        Some(value.clone())
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Converter backed by a closure.
pub struct FnConverter<F> {
    name: String,
    f: F,
}

impl<F> PropertyConverter for FnConverter<F>
where
    F: Fn(&PropertyValue) -> Option<PropertyValue> + Send + Sync,
{
    fn convert(&self, value: &PropertyValue) -> Option<PropertyValue> {
        (self.f)(value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Registry of converters keyed by class identifier pair.
pub struct ConverterRegistry {
    converters: HashMap<(String, String), ConverterHandle>,
    identity: ConverterHandle,
}

impl ConverterRegistry {
    /// Registry with only implicit same-class identity conversion.
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
            identity: Arc::new(IdentityConverter),
        }
    }

    /// Registry with conversions between the built-in value kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_fn("IntProperty", "FloatProperty", |v| {
            v.as_int().map(|i| PropertyValue::Float(i as f64))
        });
        registry.register_fn("FloatProperty", "IntProperty", |v| {
            v.as_float().map(|f| PropertyValue::Int(f.round() as i64))
        });
        registry.register_fn("BoolProperty", "IntProperty", |v| {
            v.as_bool().map(|b| PropertyValue::Int(b as i64))
        });
        registry.register_fn("IntProperty", "BoolProperty", |v| {
            v.as_int().map(|i| PropertyValue::Bool(i != 0))
        });
        for src in ["BoolProperty", "IntProperty", "FloatProperty"] {
            registry.register_fn(src, "StringProperty", |v| {
                Some(PropertyValue::String(v.to_string()))
            });
        }

        registry
    }

    pub fn register(
        &mut self,
        src_class: impl Into<String>,
        dst_class: impl Into<String>,
        converter: ConverterHandle,
    ) {
        self.converters
            .insert((src_class.into(), dst_class.into()), converter);
    }

    pub fn register_fn<F>(&mut self, src_class: &str, dst_class: &str, f: F)
    where
        F: Fn(&PropertyValue) -> Option<PropertyValue> + Send + Sync + 'static,
    {
        let name = format!("{} -> {}", src_class, dst_class);
        self.register(src_class, dst_class, Arc::new(FnConverter { name, f }));
    }

    pub fn can_convert(&self, src_class: &str, dst_class: &str) -> bool {
        src_class == dst_class
            || self
                .converters
                .contains_key(&(src_class.to_string(), dst_class.to_string()))
    }

    /// Converter for the pair. An explicitly registered converter wins over
    /// the implicit same-class identity.
    pub fn converter(&self, src_class: &str, dst_class: &str) -> Option<ConverterHandle> {
        if let Some(converter) = self
            .converters
            .get(&(src_class.to_string(), dst_class.to_string()))
        {
            return Some(converter.clone());
        }
        (src_class == dst_class).then(|| self.identity.clone())
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<_> = self.converters.keys().collect();
        pairs.sort();
        f.debug_struct("ConverterRegistry")
            .field("pairs", &pairs)
            .finish()
    }
}
