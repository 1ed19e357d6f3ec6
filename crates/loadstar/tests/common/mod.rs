//! Programmatic module fixtures shared by the integration tests.
#![allow(dead_code)]

use loadstar::{Exports, Loader, ModuleTable};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Exported value of every fixture module
#[derive(Debug)]
pub struct Fixture {
    pub name: &'static str,
    dependency: Arc<OnceLock<Exports>>,
}

impl Fixture {
    /// The dependency stored by the fixture's init hook
    pub fn dependency(&self) -> Option<&Fixture> {
        self.dependency
            .get()
            .and_then(|exports| exports.downcast_ref::<Fixture>())
    }
}

pub fn name_of(exports: &Exports) -> &'static str {
    exports
        .downcast_ref::<Fixture>()
        .map_or("<not a fixture>", |fixture| fixture.name)
}

pub fn plain(name: &'static str) -> Exports {
    Exports::new(Fixture {
        name,
        dependency: Arc::default(),
    })
}

/// A fixture whose init requires `dependency` and keeps its exports
pub fn with_dependency(name: &'static str, dependency: &'static str) -> Exports {
    let slot: Arc<OnceLock<Exports>> = Arc::default();
    let stored = Arc::clone(&slot);
    Exports::new(Fixture {
        name,
        dependency: slot,
    })
    .with_dependencies([dependency])
    .with_init(move |_, deps| {
        let stored = Arc::clone(&stored);
        async move {
            if let Some(exports) = deps.into_iter().next() {
                let _ = stored.set(exports);
            }
            anyhow::Ok(())
        }
    })
}

/// Module table mirroring a small application:
///
/// - `modules/module`: no dependencies
/// - `modules/module-with-dependency` requires `modules/dependency`
/// - `modules/module-with-nested-dependencies` declares `modules/circular`
///   and requires `modules/nested-dependency`, which requires
///   `modules/dependency`
/// - `modules/circular` declares `modules/module-with-nested-dependencies`
/// - `modules/module-with-symbols` declares `modules/component` and
///   `modules/subcomponent`
/// - `modules/nested/a` sleeps in its init, then requires `b` and `c`,
///   which both require `d`
/// - `modules/invalid` exports nothing
pub fn fixture_table() -> ModuleTable {
    let table = ModuleTable::new();
    table
        .insert("modules/module.js", |_| Ok(Some(plain("Module"))))
        .insert("modules/dependency.js", |_| Ok(Some(plain("Dependency"))))
        .insert("modules/module-with-dependency.js", |_| {
            Ok(Some(with_dependency(
                "ModuleWithDependency",
                "modules/dependency",
            )))
        })
        .insert("modules/nested-dependency.js", |_| {
            Ok(Some(with_dependency("NestedDependency", "modules/dependency")))
        })
        .insert("modules/module-with-nested-dependencies.js", |loader| {
            loader.symbol("modules/circular");
            Ok(Some(with_dependency(
                "ModuleWithNestedDependencies",
                "modules/nested-dependency",
            )))
        })
        .insert("modules/circular.js", |loader| {
            loader.symbol("modules/module-with-nested-dependencies");
            Ok(Some(plain("Circular")))
        })
        .insert("modules/module-with-symbols.js", |loader| {
            loader.symbol("modules/component");
            loader.symbol("modules/subcomponent");
            Ok(Some(plain("ModuleWithSymbols")))
        })
        .insert("modules/component.js", |_| Ok(Some(plain("Component"))))
        .insert("modules/subcomponent.js", |_| {
            Ok(Some(plain("Subcomponent")))
        })
        .insert("modules/nested/a.js", |_| {
            Ok(Some(plain("A").with_init(|loader: Loader, _| async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                loader.require("modules/nested/b").await?;
                loader.require("modules/nested/c").await?;
                anyhow::Ok(())
            })))
        })
        .insert("modules/nested/b.js", |_| {
            Ok(Some(with_dependency("B", "modules/nested/d")))
        })
        .insert("modules/nested/c.js", |_| {
            Ok(Some(with_dependency("C", "modules/nested/d")))
        })
        .insert("modules/nested/d.js", |_| Ok(Some(plain("D"))))
        .insert("modules/invalid.js", |_| Ok(None));
    table
}

pub fn fixture_loader() -> (Loader, Arc<ModuleTable>) {
    let table = Arc::new(fixture_table());
    (Loader::new(table.clone()), table)
}
