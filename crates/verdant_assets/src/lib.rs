//! # Verdant Assets
//!
//! Versioned binary formats for the models the instance renderer draws.
//!
//! ## File Families
//!
//! | Family        | Files                              | Token  |
//! |---------------|------------------------------------|--------|
//! | Map object    | `name.mapobj` + `name_NNN.mapmesh` | `VMOR` / `VMOM` |
//! | Complex model | `name.cmodel`                      | `VCMD` |
//!
//! Every file starts with `{token: u32, version: u32}`. The version must
//! match exactly: an older file needs the asset extractor rerun, a newer one
//! needs a client update. Both come back as
//! [`AssetError::VersionMismatch`] with a [`VersionSkew`].
//!
//! ## Example
//!
//! ```rust
//! use std::path::Path;
//! use verdant_assets::{AssetSource, ComplexModel, MemoryAssetSource};
//!
//! let mut source = MemoryAssetSource::new();
//! source.insert("crate.cmodel", ComplexModel::default().to_bytes());
//! let model = ComplexModel::load(&source, Path::new("crate.cmodel")).unwrap();
//! assert_eq!(model.bone_count(), 0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod complex_model;
pub mod culling;
pub mod error;
pub mod hash;
pub mod header;
pub mod map_object;
pub mod reader;
pub mod source;

pub use complex_model::{
    ComplexBone, ComplexModel, ComplexRenderBatch, ComplexSequence, ComplexTextureUnit,
    ComplexVertex, COMPLEX_MODEL_EXTENSION,
};
pub use culling::CullingData;
pub use error::{AssetError, AssetResult, VersionSkew};
pub use hash::{fnv1a_32, name_hash};
pub use header::FileHeader;
pub use map_object::{
    mesh_path, MapObject, MapObjectMaterial, MapObjectMesh, MapObjectRenderBatch, MapObjectRoot,
    MapObjectVertex, MAP_OBJECT_MESH_EXTENSION, MAP_OBJECT_ROOT_EXTENSION,
};
pub use reader::{ByteReader, ByteWriter};
pub use source::{AssetSource, FsAssetSource, MemoryAssetSource};
