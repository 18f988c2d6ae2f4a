//! # Field Access
//!
//! A [`Mutator`] is how the codec reads and writes the fields of heap objects
//! without runtime reflection. Three flavours exist:
//!
//! - [`RecordMutator`]: the generic fallback, operating on [`Record`]s. Any type
//!   name without a better match decodes into a record.
//! - [`TypedMutator<T>`]: per-type accessors for an application struct, built
//!   from closures.
//! - Any custom `impl Mutator`, registered for an exact type name or as a
//!   capability-checked matcher.
//!
//! Registration happens on a mutable [`MutatorRegistry`]; [`MutatorRegistry::freeze`]
//! ends the registration phase and yields the shared, read-only [`FrozenRegistry`].
//!
//! ## Resolution order
//! 1. The mutator registered for the exact type name (last registration wins)
//! 2. Matchers, in registration order, via their capability checks
//! 3. The fallback
//!
//! ## Field order
//! Within one encode pass a reader must return the same field names in the same
//! order every time it is asked about a type. The codec does not re-check this.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::heap::{Object, Record};
use crate::core::value::Value;
use crate::error::EncodingError;

/// Read and write capabilities for one or more object types.
pub trait Mutator: Send + Sync {
    /// Whether `instance`, stored under `type_name`, can be enumerated by this mutator.
    fn can_read(&self, type_name: &str, instance: &dyn Object) -> bool;

    /// Field names in wire order.
    fn fields(&self, type_name: &str, instance: &dyn Object) -> Result<Vec<String>, EncodingError>;

    fn get(&self, instance: &dyn Object, name: &str) -> Result<Value, EncodingError>;

    /// Whether this mutator can build instances of `type_name`.
    fn can_write(&self, type_name: &str) -> bool;

    /// Allocate an empty instance; fields are populated afterwards through `set`.
    fn construct(&self, type_name: &str) -> Result<Box<dyn Object>, EncodingError>;

    fn set(&self, instance: &mut dyn Object, name: &str, value: Value) -> Result<(), EncodingError>;
}

fn field_error(type_name: &str, detail: impl fmt::Display) -> EncodingError {
    EncodingError::FieldAccess(format!("{type_name}: {detail}"))
}

/// Generic mutator over [`Record`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordMutator;

impl Mutator for RecordMutator {
    fn can_read(&self, _type_name: &str, instance: &dyn Object) -> bool {
        instance.is::<Record>()
    }

    fn fields(&self, type_name: &str, instance: &dyn Object) -> Result<Vec<String>, EncodingError> {
        let record = instance
            .downcast_ref::<Record>()
            .ok_or_else(|| field_error(type_name, "instance is not a record"))?;
        Ok(record.field_names().map(str::to_owned).collect())
    }

    fn get(&self, instance: &dyn Object, name: &str) -> Result<Value, EncodingError> {
        let record = instance
            .downcast_ref::<Record>()
            .ok_or_else(|| field_error("record", "instance is not a record"))?;
        record
            .get(name)
            .cloned()
            .ok_or_else(|| field_error("record", format_args!("no field '{name}'")))
    }

    fn can_write(&self, _type_name: &str) -> bool {
        true
    }

    fn construct(&self, _type_name: &str) -> Result<Box<dyn Object>, EncodingError> {
        Ok(Box::new(Record::new()))
    }

    fn set(&self, instance: &mut dyn Object, name: &str, value: Value) -> Result<(), EncodingError> {
        let record = instance
            .downcast_mut::<Record>()
            .ok_or_else(|| field_error("record", "instance is not a record"))?;
        record.set(name, value);
        Ok(())
    }
}

type Getter<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<(), EncodingError> + Send + Sync>;

struct FieldAccessor<T> {
    name: String,
    get: Getter<T>,
    set: Setter<T>,
}

/// Closure-built mutator for one application type.
///
/// ```rust
/// use boson_rpc::core::mutator::TypedMutator;
/// use boson_rpc::core::value::Value;
///
/// #[derive(Debug, Clone, Default)]
/// struct User {
///     name: String,
/// }
///
/// let mutator = TypedMutator::new("User", User::default).field(
///     "name",
///     |u: &User| Value::from(u.name.as_str()),
///     |u: &mut User, v| {
///         u.name = String::try_from(v)?;
///         Ok(())
///     },
/// );
/// assert_eq!(mutator.type_name(), "User");
/// ```
pub struct TypedMutator<T> {
    type_name: String,
    construct: Box<dyn Fn() -> T + Send + Sync>,
    fields: Vec<FieldAccessor<T>>,
}

impl<T: Object> TypedMutator<T> {
    pub fn new<F>(type_name: impl Into<String>, construct: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            construct: Box::new(construct),
            fields: Vec::new(),
        }
    }

    /// Add a field. Fields are written in the order they are added.
    pub fn field<G, S>(mut self, name: impl Into<String>, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&mut T, Value) -> Result<(), EncodingError> + Send + Sync + 'static,
    {
        self.fields.push(FieldAccessor {
            name: name.into(),
            get: Box::new(get),
            set: Box::new(set),
        });
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    fn accessor(&self, name: &str) -> Result<&FieldAccessor<T>, EncodingError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| field_error(&self.type_name, format_args!("no field '{name}'")))
    }

    fn downcast<'a>(&self, instance: &'a dyn Object) -> Result<&'a T, EncodingError> {
        instance
            .downcast_ref::<T>()
            .ok_or_else(|| field_error(&self.type_name, "instance has the wrong Rust type"))
    }
}

impl<T: Object> Mutator for TypedMutator<T> {
    fn can_read(&self, type_name: &str, instance: &dyn Object) -> bool {
        type_name == self.type_name && instance.is::<T>()
    }

    fn fields(&self, _type_name: &str, _instance: &dyn Object) -> Result<Vec<String>, EncodingError> {
        Ok(self.fields.iter().map(|f| f.name.clone()).collect())
    }

    fn get(&self, instance: &dyn Object, name: &str) -> Result<Value, EncodingError> {
        let typed = self.downcast(instance)?;
        Ok((self.accessor(name)?.get)(typed))
    }

    fn can_write(&self, type_name: &str) -> bool {
        type_name == self.type_name
    }

    fn construct(&self, _type_name: &str) -> Result<Box<dyn Object>, EncodingError> {
        Ok(Box::new((self.construct)()))
    }

    fn set(&self, instance: &mut dyn Object, name: &str, value: Value) -> Result<(), EncodingError> {
        let accessor = self.accessor(name)?;
        let typed = instance
            .downcast_mut::<T>()
            .ok_or_else(|| field_error(&self.type_name, "instance has the wrong Rust type"))?;
        (accessor.set)(typed, value)
    }
}

/// Mutable registry used during start-up.
pub struct MutatorRegistry {
    by_type: HashMap<String, Arc<dyn Mutator>>,
    matchers: Vec<Arc<dyn Mutator>>,
    fallback: Arc<dyn Mutator>,
}

impl Default for MutatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MutatorRegistry {
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            matchers: Vec::new(),
            fallback: Arc::new(RecordMutator),
        }
    }

    /// Register `mutator` for exactly `type_name`, replacing any earlier one.
    pub fn register<M>(&mut self, type_name: impl Into<String>, mutator: M) -> &mut Self
    where
        M: Mutator + 'static,
    {
        let type_name = type_name.into();
        if self
            .by_type
            .insert(type_name.clone(), Arc::new(mutator))
            .is_some()
        {
            tracing::debug!(type_name = %type_name, "Replaced mutator registration");
        }
        self
    }

    /// Register a typed mutator under its own type name.
    pub fn register_typed<T: Object>(&mut self, mutator: TypedMutator<T>) -> &mut Self {
        let type_name = mutator.type_name().to_owned();
        self.register(type_name, mutator)
    }

    /// Register a mutator consulted through its capability checks.
    pub fn register_matcher<M>(&mut self, mutator: M) -> &mut Self
    where
        M: Mutator + 'static,
    {
        self.matchers.push(Arc::new(mutator));
        self
    }

    /// Replace the generic fallback.
    pub fn set_fallback<M>(&mut self, mutator: M) -> &mut Self
    where
        M: Mutator + 'static,
    {
        self.fallback = Arc::new(mutator);
        self
    }

    /// End the registration phase.
    pub fn freeze(self) -> Arc<FrozenRegistry> {
        tracing::debug!(
            typed = self.by_type.len(),
            matchers = self.matchers.len(),
            "Mutator registry frozen"
        );
        Arc::new(FrozenRegistry {
            by_type: self.by_type,
            matchers: self.matchers,
            fallback: self.fallback,
        })
    }
}

/// Read-only registry shared by every codec after start-up.
pub struct FrozenRegistry {
    by_type: HashMap<String, Arc<dyn Mutator>>,
    matchers: Vec<Arc<dyn Mutator>>,
    fallback: Arc<dyn Mutator>,
}

impl fmt::Debug for FrozenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.by_type.keys().collect();
        types.sort();
        f.debug_struct("FrozenRegistry")
            .field("types", &types)
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

impl Default for FrozenRegistry {
    fn default() -> Self {
        FrozenRegistry {
            by_type: HashMap::new(),
            matchers: Vec::new(),
            fallback: Arc::new(RecordMutator),
        }
    }
}

impl FrozenRegistry {
    /// Registry with only the record fallback.
    pub fn generic() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn resolve_reader(
        &self,
        type_name: &str,
        instance: &dyn Object,
    ) -> Result<&dyn Mutator, EncodingError> {
        self.candidates(type_name)
            .find(|m| m.can_read(type_name, instance))
            .ok_or_else(|| field_error(type_name, "no mutator can read this object"))
    }

    pub fn resolve_writer(&self, type_name: &str) -> Result<&dyn Mutator, EncodingError> {
        self.candidates(type_name)
            .find(|m| m.can_write(type_name))
            .ok_or_else(|| field_error(type_name, "no mutator can construct this type"))
    }

    fn candidates<'a>(&'a self, type_name: &str) -> impl Iterator<Item = &'a dyn Mutator> + 'a {
        self.by_type
            .get(type_name)
            .into_iter()
            .chain(self.matchers.iter())
            .chain(std::iter::once(&self.fallback))
            .map(|m| m.as_ref())
    }
}
