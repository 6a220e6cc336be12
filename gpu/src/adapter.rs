//! Physical adapter description and selection.
//!
//! Drivers probe every adapter the native API enumerates into an
//! [`AdapterDescription`] and hand the list to [`select_adapter`]. Selection is
//! a pure function of that list, so it is deterministic and testable without a
//! GPU.
//!
//! # Ranking
//!
//! Adapters are ranked by device class (see [`AdapterType::rank`]). A class
//! that appears later in the list can never be overridden by a weaker class,
//! even when the stronger adapter turns out to be unusable. In that case
//! selection fails instead of falling back to, for example, a software
//! rasterizer sitting next to a real GPU with a broken driver.

use std::fmt;

use bitflags::bitflags;

use crate::capabilities::{DeviceExtensions, ExtensionList};
use crate::error::{GpuError, GpuResult};

/// Class of a physical adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdapterType {
    /// Dedicated GPU.
    Discrete,
    /// GPU exposed through a virtualization layer.
    Virtual,
    /// GPU sharing memory with the CPU.
    Integrated,
    /// CPU implementation (e.g. lavapipe / SwiftShader).
    Software,
    /// Anything the driver cannot classify.
    #[default]
    Other,
}

impl AdapterType {
    /// Device-class rank. Higher is preferred.
    pub fn rank(self) -> u8 {
        match self {
            Self::Discrete => 4,
            Self::Virtual => 3,
            Self::Integrated => 2,
            Self::Software => 1,
            Self::Other => 0,
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discrete => "discrete",
            Self::Virtual => "virtual",
            Self::Integrated => "integrated",
            Self::Software => "software",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Operations a queue family can execute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueCapabilities: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

/// A group of execution queues sharing a capability mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyDescriptor {
    /// Index of the family in the adapter's family table.
    pub index: u32,
    /// Operations the family supports.
    pub capabilities: QueueCapabilities,
    /// The family can present to the reference surface.
    pub supports_present: bool,
}

impl QueueFamilyDescriptor {
    pub fn new(index: u32, capabilities: QueueCapabilities, supports_present: bool) -> Self {
        Self {
            index,
            capabilities,
            supports_present,
        }
    }

    /// Preference among graphics families: all attributes (3), graphics and
    /// compute (2), graphics only (1).
    pub fn rank(&self) -> u8 {
        if self.capabilities.contains(QueueCapabilities::COMPUTE) {
            if self.capabilities.contains(QueueCapabilities::TRANSFER) {
                3
            } else {
                2
            }
        } else {
            1
        }
    }
}

/// Outcome of querying swapchain support against the reference surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceSupport {
    /// No reference surface was supplied; presentation is not a criterion.
    Headless,
    /// The queries succeeded with these list lengths.
    Queried {
        format_count: usize,
        present_mode_count: usize,
    },
    /// A query failed; the adapter cannot be used for presentation.
    QueryFailed(String),
}

impl SurfaceSupport {
    /// The surface exposes at least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        match self {
            Self::Headless => true,
            Self::Queried {
                format_count,
                present_mode_count,
            } => *format_count > 0 && *present_mode_count > 0,
            Self::QueryFailed(_) => false,
        }
    }

    fn requires_present(&self) -> bool {
        !matches!(self, Self::Headless)
    }
}

/// Everything selection needs to know about one physical adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDescription {
    pub name: String,
    pub adapter_type: AdapterType,
    pub extensions: DeviceExtensions,
    pub queue_families: Vec<QueueFamilyDescriptor>,
    pub surface_support: SurfaceSupport,
}

impl AdapterDescription {
    /// A fully capable adapter of the given class with a single
    /// graphics+compute+transfer family that can present.
    pub fn new(name: impl Into<String>, adapter_type: AdapterType) -> Self {
        Self {
            name: name.into(),
            adapter_type,
            extensions: DeviceExtensions::REQUIRED,
            queue_families: vec![QueueFamilyDescriptor::new(
                0,
                QueueCapabilities::all(),
                true,
            )],
            surface_support: SurfaceSupport::Queried {
                format_count: 1,
                present_mode_count: 1,
            },
        }
    }

    pub fn with_extensions(mut self, extensions: DeviceExtensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_queue_families(mut self, families: Vec<QueueFamilyDescriptor>) -> Self {
        self.queue_families = families;
        self
    }

    pub fn with_surface_support(mut self, support: SurfaceSupport) -> Self {
        self.surface_support = support;
        self
    }

    /// Pick the queue family to use on this adapter, if any qualifies.
    ///
    /// The family must support graphics and, unless headless, presentation.
    /// Higher [`QueueFamilyDescriptor::rank`] wins; the first family seen wins
    /// ties.
    pub fn best_queue_family(&self) -> Option<u32> {
        let requires_present = self.surface_support.requires_present();
        let mut best: Option<(u8, u32)> = None;

        for family in &self.queue_families {
            if !family.capabilities.contains(QueueCapabilities::GRAPHICS) {
                continue;
            }
            if requires_present && !family.supports_present {
                continue;
            }
            let rank = family.rank();
            if best.is_none_or(|(best_rank, _)| rank > best_rank) {
                best = Some((rank, family.index));
            }
        }

        best.map(|(_, index)| index)
    }

    /// Check every usability criterion, returning the chosen queue family.
    pub fn evaluate(&self) -> Result<u32, Rejection> {
        if !self.extensions.supports_required() {
            return Err(Rejection::MissingExtensions(
                self.extensions.missing_required(),
            ));
        }
        let family = self.best_queue_family().ok_or(Rejection::NoQueueFamily)?;
        if !self.surface_support.is_adequate() {
            return Err(Rejection::NoSurfaceSupport);
        }
        Ok(family)
    }
}

/// Why a candidate adapter is not usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Outranked by a stronger device class seen earlier.
    Outranked,
    /// Required extensions are absent.
    MissingExtensions(DeviceExtensions),
    /// No family is both graphics- and present-capable.
    NoQueueFamily,
    /// The surface exposes no formats or no present modes.
    NoSurfaceSupport,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outranked => write!(f, "outranked by a stronger device class"),
            Self::MissingExtensions(missing) => {
                write!(f, "missing required extensions: {}", ExtensionList(*missing))
            }
            Self::NoQueueFamily => write!(f, "no graphics queue family that can present"),
            Self::NoSurfaceSupport => write!(f, "no surface formats or present modes"),
        }
    }
}

/// The adapter and queue family selection committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSelection {
    /// Index into the candidate list.
    pub index: usize,
    /// Queue family index on that adapter.
    pub queue_family: u32,
}

/// Per-candidate verdict recorded during selection, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateVerdict {
    pub index: usize,
    pub result: Result<u32, Rejection>,
}

/// Choose exactly one adapter from `candidates`.
pub fn select_adapter(candidates: &[AdapterDescription]) -> GpuResult<AdapterSelection> {
    select_adapter_with_verdicts(candidates).0
}

/// Like [`select_adapter`], additionally returning the verdict for every
/// candidate in enumeration order.
pub fn select_adapter_with_verdicts(
    candidates: &[AdapterDescription],
) -> (GpuResult<AdapterSelection>, Vec<CandidateVerdict>) {
    let mut verdicts = Vec::with_capacity(candidates.len());

    if candidates.is_empty() {
        return (
            Err(GpuError::Unsupported(
                "no GPU adapters were enumerated".to_string(),
            )),
            verdicts,
        );
    }

    let mut highest_rank = 0u8;
    let mut selected: Option<AdapterSelection> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let rank = candidate.adapter_type.rank();

        if rank < highest_rank {
            verdicts.push(CandidateVerdict {
                index,
                result: Err(Rejection::Outranked),
            });
            continue;
        }

        let result = candidate.evaluate();
        match &result {
            Ok(queue_family) => {
                // An equal-rank usable adapter later in the list replaces the
                // earlier one.
                selected = Some(AdapterSelection {
                    index,
                    queue_family: *queue_family,
                });
                highest_rank = rank;
            }
            Err(_) if rank > highest_rank => {
                selected = None;
                highest_rank = rank;
            }
            Err(_) => {}
        }
        verdicts.push(CandidateVerdict { index, result });
    }

    let result = selected.ok_or_else(|| {
        GpuError::Unsupported("no usable GPU adapter at the highest device class".to_string())
    });
    (result, verdicts)
}

/// Properties of the adapter a device was created on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub adapter_type: AdapterType,
    /// Queue family the device submits to.
    pub queue_family: u32,
    /// Driver name, when the driver can report it.
    pub driver_name: Option<String>,
    /// Free-form driver version string.
    pub driver_info: Option<String>,
    /// Conformance test suite version the driver passed, as `major.minor.sub.patch`.
    pub conformance_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usable(name: &str, adapter_type: AdapterType) -> AdapterDescription {
        AdapterDescription::new(name, adapter_type)
    }

    fn unusable(name: &str, adapter_type: AdapterType) -> AdapterDescription {
        AdapterDescription::new(name, adapter_type)
            .with_extensions(DeviceExtensions::KHR_SWAPCHAIN)
    }

    #[test]
    fn test_rank_order() {
        assert!(AdapterType::Discrete.rank() > AdapterType::Virtual.rank());
        assert!(AdapterType::Virtual.rank() > AdapterType::Integrated.rank());
        assert!(AdapterType::Integrated.rank() > AdapterType::Software.rank());
        assert!(AdapterType::Software.rank() > AdapterType::Other.rank());
    }

    #[test]
    fn test_empty_list_fails() {
        let err = select_adapter(&[]).unwrap_err();
        assert!(matches!(err, GpuError::Unsupported(_)));
    }

    #[test]
    fn test_prefers_higher_class() {
        let candidates = [
            usable("igpu", AdapterType::Integrated),
            usable("dgpu", AdapterType::Discrete),
            usable("llvmpipe", AdapterType::Software),
        ];
        let selection = select_adapter(&candidates).unwrap();
        assert_eq!(selection.index, 1);
    }

    #[test]
    fn test_higher_unusable_disqualifies_lower_usable() {
        // integrated-usable, discrete-unusable, virtual-usable
        let candidates = [
            usable("igpu", AdapterType::Integrated),
            unusable("dgpu", AdapterType::Discrete),
            usable("vgpu", AdapterType::Virtual),
        ];
        let (result, verdicts) = select_adapter_with_verdicts(&candidates);
        assert!(matches!(result, Err(GpuError::Unsupported(_))));
        assert_eq!(verdicts[2].result, Err(Rejection::Outranked));
    }

    #[test]
    fn test_higher_unusable_first_still_disqualifies() {
        let candidates = [
            unusable("dgpu", AdapterType::Discrete),
            usable("igpu", AdapterType::Integrated),
        ];
        assert!(select_adapter(&candidates).is_err());
    }

    #[test]
    fn test_equal_class_later_usable_wins() {
        let candidates = [
            unusable("dgpu0", AdapterType::Discrete),
            usable("dgpu1", AdapterType::Discrete),
            usable("dgpu2", AdapterType::Discrete),
        ];
        let selection = select_adapter(&candidates).unwrap();
        assert_eq!(selection.index, 2);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let candidates = [
            usable("a", AdapterType::Integrated),
            usable("b", AdapterType::Virtual),
            unusable("c", AdapterType::Software),
        ];
        let first = select_adapter(&candidates).unwrap();
        let second = select_adapter(&candidates).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.index, 1);
    }

    #[test]
    fn test_queue_family_ranking() {
        let adapter = usable("dgpu", AdapterType::Discrete).with_queue_families(vec![
            QueueFamilyDescriptor::new(0, QueueCapabilities::GRAPHICS, true),
            QueueFamilyDescriptor::new(
                1,
                QueueCapabilities::GRAPHICS | QueueCapabilities::COMPUTE,
                true,
            ),
            QueueFamilyDescriptor::new(2, QueueCapabilities::all(), false),
            QueueFamilyDescriptor::new(3, QueueCapabilities::all(), true),
            QueueFamilyDescriptor::new(4, QueueCapabilities::all(), true),
        ]);
        // Family 2 cannot present; 3 and 4 tie, first seen wins.
        assert_eq!(adapter.best_queue_family(), Some(3));
    }

    #[test]
    fn test_compute_only_family_rejected() {
        let adapter = usable("dgpu", AdapterType::Discrete).with_queue_families(vec![
            QueueFamilyDescriptor::new(0, QueueCapabilities::COMPUTE, true),
        ]);
        assert_eq!(adapter.evaluate(), Err(Rejection::NoQueueFamily));
    }

    #[test]
    fn test_surface_support_requirements() {
        let no_modes = usable("dgpu", AdapterType::Discrete).with_surface_support(
            SurfaceSupport::Queried {
                format_count: 3,
                present_mode_count: 0,
            },
        );
        assert_eq!(no_modes.evaluate(), Err(Rejection::NoSurfaceSupport));

        let failed = usable("dgpu", AdapterType::Discrete)
            .with_surface_support(SurfaceSupport::QueryFailed("lost".into()));
        assert_eq!(failed.evaluate(), Err(Rejection::NoSurfaceSupport));
    }

    #[test]
    fn test_headless_ignores_present_support() {
        let adapter = usable("dgpu", AdapterType::Discrete)
            .with_queue_families(vec![QueueFamilyDescriptor::new(
                5,
                QueueCapabilities::GRAPHICS,
                false,
            )])
            .with_surface_support(SurfaceSupport::Headless);
        assert_eq!(adapter.evaluate(), Ok(5));
    }

    #[test]
    fn test_other_class_alone_is_selectable() {
        let candidates = [usable("mystery", AdapterType::Other)];
        assert_eq!(select_adapter(&candidates).unwrap().index, 0);
    }
}
