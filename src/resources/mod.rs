pub mod common;
pub mod manifest;

pub use common::{
    API_VERSION, FIELD_MANAGER, INSTANCE_LABEL, KIND, ResourceKind, ResourceNames,
    owner_reference, standard_labels,
};
pub use manifest::{ManifestRenderer, OwnedResource};
