//! In-process registry of bound record types.

use super::repository::{BindOptions, Repository};
use super::OrmResult;
use crate::db::Driver;
use crate::model::attributes::AttributeMap;
use crate::model::record::Record;
use log::info;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Binding registry keyed by record type.
///
/// Each registered type owns an independent repository, identity map and
/// statement cache. Binding a type again replaces its registration; handles
/// returned earlier keep working against their own cache.
pub struct Orm<D> {
    driver: D,
    options: BindOptions,
    bindings: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl<D: Driver + Clone + 'static> Orm<D> {
    pub fn new(driver: D) -> Self {
        Self::with_options(driver, BindOptions::default())
    }

    /// Creates a registry whose bindings default to `options`.
    pub fn with_options(driver: D, options: BindOptions) -> Self {
        Self {
            driver,
            options,
            bindings: RefCell::new(HashMap::new()),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Binds `T` to `table` with the registry's default options.
    pub async fn bind<T: Record + 'static>(
        &self,
        table: &str,
        attributes: AttributeMap,
    ) -> OrmResult<Rc<Repository<T, D>>> {
        self.bind_with::<T>(table, attributes, self.options).await
    }

    pub async fn bind_with<T: Record + 'static>(
        &self,
        table: &str,
        attributes: AttributeMap,
        options: BindOptions,
    ) -> OrmResult<Rc<Repository<T, D>>> {
        let repository = Rc::new(
            Repository::<T, D>::bind(self.driver.clone(), table, attributes, options).await?,
        );
        let erased: Rc<dyn Any> = repository.clone();
        let previous = self
            .bindings
            .borrow_mut()
            .insert(TypeId::of::<T>(), erased);
        if previous.is_some() {
            info!(
                "event=schema_rebind module=repo status=ok record={} table={}",
                std::any::type_name::<T>(),
                table
            );
        }
        Ok(repository)
    }

    /// Returns the current repository for `T`, if bound.
    pub fn repository<T: Record + 'static>(&self) -> Option<Rc<Repository<T, D>>> {
        let erased = self.bindings.borrow().get(&TypeId::of::<T>()).cloned()?;
        erased.downcast::<Repository<T, D>>().ok()
    }

    pub fn is_bound<T: Record + 'static>(&self) -> bool {
        self.bindings.borrow().contains_key(&TypeId::of::<T>())
    }

    /// Removes `T`'s registration. Storage is left untouched.
    pub fn unbind<T: Record + 'static>(&self) -> bool {
        self.bindings
            .borrow_mut()
            .remove(&TypeId::of::<T>())
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.borrow().is_empty()
    }
}
