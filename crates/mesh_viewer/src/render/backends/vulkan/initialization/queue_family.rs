//! Queue family discovery

use ash::vk;
use bitflags::bitflags;

use crate::render::backends::vulkan::core::error::{VulkanError, VulkanResult};

bitflags! {
    /// Queue roles the caller needs from a device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueRoles: u32 {
        /// Graphics commands
        const GRAPHICS = 1;
        /// Presentation to the attached surface
        const PRESENT = 1 << 1;
        /// Compute dispatches
        const COMPUTE = 1 << 2;
    }
}

/// Family index per role; `None` means the role is unassigned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Graphics family
    pub graphics: Option<u32>,
    /// Presentation family
    pub present: Option<u32>,
    /// Compute family
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// Assigned families without duplicates, in graphics, present, compute order
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);
        for family in [self.graphics, self.present, self.compute].into_iter().flatten() {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }

    /// Whether graphics and presentation run on different families
    pub fn needs_ownership_transfer(&self) -> bool {
        matches!((self.graphics, self.present), (Some(g), Some(p)) if g != p)
    }
}

/// Capabilities of one queue family as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyCaps {
    /// Queue flags
    pub flags: vk::QueueFlags,
    /// Whether the family can present to the surface
    pub present: bool,
}

/// Resolve the requested roles against a family table
///
/// A single family with graphics, compute and presentation wins; then one
/// with graphics and compute; then the first graphics family. Presentation
/// and compute fall back to the first family capable of each. Only requested
/// roles are assigned, and a requested role left unassigned is an error.
pub fn discover_queue_families(families: &[FamilyCaps], requested: QueueRoles) -> VulkanResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();
    let wants_present = requested.contains(QueueRoles::PRESENT);
    let wants_compute = requested.contains(QueueRoles::COMPUTE);

    let position = |pred: &dyn Fn(&FamilyCaps) -> bool| families.iter().position(pred).map(|i| i as u32);
    let graphics_compute = |caps: &FamilyCaps| caps.flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE);

    if requested.contains(QueueRoles::GRAPHICS) {
        let all_in_one = if wants_present {
            position(&|caps| graphics_compute(caps) && caps.present)
        } else {
            None
        };

        if let Some(family) = all_in_one {
            indices.graphics = Some(family);
            indices.present = Some(family);
            if wants_compute {
                indices.compute = Some(family);
            }
        } else if let Some(family) = position(&graphics_compute) {
            indices.graphics = Some(family);
            if wants_compute {
                indices.compute = Some(family);
            }
        } else {
            indices.graphics = position(&|caps| caps.flags.contains(vk::QueueFlags::GRAPHICS));
        }
    }

    if wants_present && indices.present.is_none() {
        indices.present = position(&|caps| caps.present);
    }
    if wants_compute && indices.compute.is_none() {
        indices.compute = position(&|caps| caps.flags.contains(vk::QueueFlags::COMPUTE));
    }

    let missing: Vec<&str> = [
        (QueueRoles::GRAPHICS, indices.graphics, "graphics"),
        (QueueRoles::PRESENT, indices.present, "present"),
        (QueueRoles::COMPUTE, indices.compute, "compute"),
    ]
    .into_iter()
    .filter(|(role, index, _)| requested.contains(*role) && index.is_none())
    .map(|(_, _, name)| name)
    .collect();

    if missing.is_empty() {
        log::debug!("[queueFamily] Resolved {:?} for {:?}", indices, requested);
        Ok(indices)
    } else {
        Err(VulkanError::validation(
            "queueFamily",
            format!("no queue family for requested role(s): {}", missing.join(", ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(flags: vk::QueueFlags, present: bool) -> FamilyCaps {
        FamilyCaps { flags, present }
    }

    #[test]
    fn test_headless_compute_only_uses_one_family() {
        let table = [caps(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false)];
        let indices = discover_queue_families(&table, QueueRoles::COMPUTE).unwrap();

        assert_eq!(indices.present, None);
        assert_eq!(indices.graphics, None);
        assert_eq!(indices.compute, Some(0));
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_prefers_single_family_for_all_roles() {
        let table = [
            caps(vk::QueueFlags::GRAPHICS, false),
            caps(vk::QueueFlags::COMPUTE, true),
            caps(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
        ];
        let indices = discover_queue_families(&table, QueueRoles::all()).unwrap();

        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(2));
        assert_eq!(indices.compute, Some(2));
        assert!(!indices.needs_ownership_transfer());
    }

    #[test]
    fn test_split_present_family_requires_transfer() {
        let table = [
            caps(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            caps(vk::QueueFlags::TRANSFER, true),
        ];
        let indices = discover_queue_families(&table, QueueRoles::GRAPHICS | QueueRoles::PRESENT).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.compute, None);
        assert_eq!(indices.unique_families(), vec![0, 1]);
        assert!(indices.needs_ownership_transfer());
    }

    #[test]
    fn test_missing_requested_role_fails() {
        let table = [caps(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false)];
        let err = discover_queue_families(&table, QueueRoles::GRAPHICS | QueueRoles::PRESENT).unwrap_err();

        assert!(err.to_string().contains("present"));
    }
}
