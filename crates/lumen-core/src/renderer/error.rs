// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the rendering subsystem.
//!
//! Residency errors ([`ResourceError::UnknownMesh`], [`ResourceError::UnknownMaterial`],
//! [`ResourceError::AssetLoadFailed`]) are recoverable: the affected renderables are
//! left out of the frame and retried later. Synchronization and device errors are
//! fatal and must reach the owner of the frame loop.

use crate::asset::{AssetError, AssetUUID};
use std::fmt;
use std::time::Duration;

/// An error related to the creation or use of a GPU resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// An attempt was made to access a resource out of its bounds.
    OutOfBounds,
    /// The device could not allocate a resource of the requested size.
    AllocationFailed {
        /// Label of the resource being allocated.
        label: String,
        /// Requested size in bytes.
        size: u64,
    },
    /// The mesh (or sub-mesh) has no resident geometry region.
    UnknownMesh(AssetUUID),
    /// The material instance is not resident.
    UnknownMaterial(AssetUUID),
    /// The asset loader could not provide an asset.
    AssetLoadFailed {
        /// The asset that failed.
        asset: AssetUUID,
        /// Why it failed.
        reason: String,
    },
}

impl ResourceError {
    /// Residency errors mean "not resident yet" rather than a broken frame.
    pub fn is_residency(&self) -> bool {
        matches!(
            self,
            ResourceError::UnknownMesh(_)
                | ResourceError::UnknownMaterial(_)
                | ResourceError::AssetLoadFailed { .. }
        )
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds => write!(f, "Resource access out of bounds."),
            ResourceError::AllocationFailed { label, size } => {
                write!(f, "Failed to allocate {size} bytes for '{label}'")
            }
            ResourceError::UnknownMesh(id) => write!(f, "Mesh {id} is not resident"),
            ResourceError::UnknownMaterial(id) => write!(f, "Material {id} is not resident"),
            ResourceError::AssetLoadFailed { asset, reason } => {
                write!(f, "Failed to load asset {asset}: {reason}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<AssetError> for ResourceError {
    fn from(err: AssetError) -> Self {
        ResourceError::AssetLoadFailed {
            asset: err.asset(),
            reason: err.to_string(),
        }
    }
}

/// A high-level error that can occur within the frame loop or graphics device.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A failure occurred during the initialization of the graphics backend.
    InitializationFailed(String),
    /// The GPU did not retire a frame slot within the bounded wait.
    DeviceTimeout {
        /// The frame number being acquired.
        frame: u64,
        /// The ring slot that stayed busy.
        slot: usize,
        /// How long the CPU waited.
        waited: Duration,
    },
    /// The graphics device was lost. This is unrecoverable for the renderer.
    DeviceLost(String),
    /// Failed to acquire the next image from the swapchain.
    SurfaceAcquisitionFailed(String),
    /// A frame-scoped operation was called while no frame was acquired.
    FrameNotAcquired,
    /// A frame was acquired while the previous one was still being recorded.
    FrameAlreadyAcquired {
        /// The slot currently being recorded.
        slot: usize,
    },
    /// An error occurred while managing a GPU resource.
    Resource(ResourceError),
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl RenderError {
    /// Whether the frame loop must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            RenderError::DeviceTimeout { .. }
            | RenderError::DeviceLost(_)
            | RenderError::InitializationFailed(_) => true,
            RenderError::Resource(err) => !err.is_residency(),
            _ => false,
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize graphics backend: {msg}")
            }
            RenderError::DeviceTimeout {
                frame,
                slot,
                waited,
            } => write!(
                f,
                "GPU did not retire frame slot {slot} within {waited:?} (acquiring frame {frame})"
            ),
            RenderError::DeviceLost(msg) => write!(f, "The graphics device was lost: {msg}"),
            RenderError::SurfaceAcquisitionFailed(msg) => {
                write!(f, "Failed to acquire surface for rendering: {msg}")
            }
            RenderError::FrameNotAcquired => write!(f, "No frame is currently acquired."),
            RenderError::FrameAlreadyAcquired { slot } => {
                write!(f, "Frame slot {slot} is still being recorded.")
            }
            RenderError::Resource(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::Resource(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn allocation_failed_display() {
        let err = ResourceError::AllocationFailed {
            label: "vertex arena".to_string(),
            size: 1024,
        };
        assert_eq!(format!("{err}"), "Failed to allocate 1024 bytes for 'vertex arena'");
    }

    #[test]
    fn asset_error_converts_to_load_failure() {
        let id = AssetUUID::from_u128(3);
        let err: ResourceError = AssetError::NotFound(id).into();
        assert!(matches!(err, ResourceError::AssetLoadFailed { asset, .. } if asset == id));
        assert!(err.is_residency());
    }

    #[test]
    fn render_error_wraps_resource_error() {
        let render_err: RenderError = ResourceError::OutOfBounds.into();
        assert_eq!(
            format!("{render_err}"),
            "Graphics resource operation failed: Resource access out of bounds."
        );
        assert!(render_err.source().is_some());
    }

    #[test]
    fn fatality_classification() {
        let timeout = RenderError::DeviceTimeout {
            frame: 4,
            slot: 0,
            waited: Duration::from_secs(1),
        };
        assert!(timeout.is_fatal());
        assert!(RenderError::DeviceLost("driver reset".into()).is_fatal());
        assert!(!RenderError::Resource(ResourceError::UnknownMesh(AssetUUID::from_u128(1))).is_fatal());
        assert!(RenderError::Resource(ResourceError::AllocationFailed {
            label: "x".into(),
            size: 1
        })
        .is_fatal());
    }
}
