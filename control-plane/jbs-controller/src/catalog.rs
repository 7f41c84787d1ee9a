//! The set of resource kinds the controller process knows how to address.
//!
//! Independent schema sets are registered into a [`TypeCatalogBuilder`] and
//! frozen into a [`TypeCatalog`]. A kind may only be contributed once; a
//! second contribution is a [`SchemaConflict`] and the builder must be
//! discarded.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{
    ConfigMap, Event, Namespace, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    Resource,
    api::{ApiResource, GroupVersionKind},
};

use crate::crd::{
    artifact_build::ArtifactBuild,
    dependency_build::DependencyBuild,
    tekton::{pipeline_run_resource, task_run_resource},
};
use crate::error::SchemaConflict;

#[derive(Clone, Debug)]
pub struct SchemaSet {
    name: String,
    resources: Vec<ApiResource>,
}

impl SchemaSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }

    pub fn with<K>(self) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        self.with_resource(ApiResource::erase::<K>(&()))
    }

    pub fn with_resource(mut self, resource: ApiResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kinds(&self) -> impl Iterator<Item = GroupVersionKind> + '_ {
        self.resources.iter().map(gvk_of)
    }
}

/// Platform-native kinds used by the controllers.
pub fn platform_schemas() -> SchemaSet {
    SchemaSet::new("platform")
        .with::<ConfigMap>()
        .with::<Secret>()
        .with::<Pod>()
        .with::<Service>()
        .with::<ServiceAccount>()
        .with::<Namespace>()
        .with::<Event>()
        .with::<CustomResourceDefinition>()
}

/// The build service's own custom resources.
pub fn build_schemas() -> SchemaSet {
    SchemaSet::new("jvmbuildservice")
        .with::<ArtifactBuild>()
        .with::<DependencyBuild>()
}

/// Pipeline kinds owned by the pipeline engine.
pub fn pipeline_schemas() -> SchemaSet {
    SchemaSet::new("tekton")
        .with_resource(pipeline_run_resource())
        .with_resource(task_run_resource())
}

/// Every schema set the controller process registers, in registration order.
pub fn default_schema_sets() -> Vec<SchemaSet> {
    vec![platform_schemas(), build_schemas(), pipeline_schemas()]
}

/// Group, version and kind of a statically typed resource.
pub fn kind_of<K: Resource<DynamicType = ()>>() -> GroupVersionKind {
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

pub fn gvk_of(resource: &ApiResource) -> GroupVersionKind {
    GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind)
}

#[derive(Clone, Debug)]
struct CatalogEntry {
    set: String,
    resource: ApiResource,
}

#[derive(Default, Debug)]
pub struct TypeCatalogBuilder {
    entries: HashMap<GroupVersionKind, CatalogEntry>,
}

impl TypeCatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every kind in `set`. Nothing is added when any kind conflicts.
    pub fn register(&mut self, set: SchemaSet) -> Result<(), SchemaConflict> {
        let mut staged: HashMap<GroupVersionKind, CatalogEntry> =
            HashMap::with_capacity(set.resources.len());
        for resource in &set.resources {
            let gvk = gvk_of(resource);
            let existing = self
                .entries
                .get(&gvk)
                .or_else(|| staged.get(&gvk))
                .map(|e| e.set.clone());
            if let Some(existing_set) = existing {
                return Err(SchemaConflict {
                    kind: gvk,
                    existing_set,
                    conflicting_set: set.name.clone(),
                });
            }
            staged.insert(
                gvk,
                CatalogEntry {
                    set: set.name.clone(),
                    resource: resource.clone(),
                },
            );
        }
        self.entries.extend(staged);
        Ok(())
    }

    pub fn build(self) -> TypeCatalog {
        TypeCatalog {
            entries: self.entries,
        }
    }
}

/// Frozen catalog. Read-only once built.
#[derive(Clone, Debug)]
pub struct TypeCatalog {
    entries: HashMap<GroupVersionKind, CatalogEntry>,
}

impl TypeCatalog {
    /// Register all `sets` in order, failing on the first conflict.
    pub fn from_sets(
        sets: impl IntoIterator<Item = SchemaSet>,
    ) -> Result<Self, SchemaConflict> {
        let mut builder = TypeCatalogBuilder::new();
        for set in sets {
            builder.register(set)?;
        }
        Ok(builder.build())
    }

    pub fn resolve(&self, gvk: &GroupVersionKind) -> Option<&ApiResource> {
        self.entries.get(gvk).map(|e| &e.resource)
    }

    pub fn contains(&self, gvk: &GroupVersionKind) -> bool {
        self.entries.contains_key(gvk)
    }

    /// Name of the schema set that contributed `gvk`.
    pub fn origin(&self, gvk: &GroupVersionKind) -> Option<&str> {
        self.entries.get(gvk).map(|e| e.set.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
