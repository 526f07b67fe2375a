//! Permission matrix: access class × permission type
//!
//! Bits follow the familiar octal layout (`0o600` = owner read + owner write).

use bitflags::bitflags;

/// Who a permission applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessClass {
    Owner,
    Group,
    Other,
}

impl AccessClass {
    pub const ALL: [Self; 3] = [Self::Owner, Self::Group, Self::Other];

    const fn shift(self) -> u32 {
        match self {
            Self::Owner => 6,
            Self::Group => 3,
            Self::Other => 0,
        }
    }
}

/// What a permission allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionType {
    Read,
    Write,
    Execute,
}

impl PermissionType {
    pub const ALL: [Self; 3] = [Self::Read, Self::Write, Self::Execute];

    const fn bit(self) -> u32 {
        match self {
            Self::Read => 0o4,
            Self::Write => 0o2,
            Self::Execute => 0o1,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PermissionBits: u32 {
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const OWNER_EXECUTE = 0o100;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const GROUP_EXECUTE = 0o010;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
        const OTHER_EXECUTE = 0o001;
    }
}

impl PermissionBits {
    /// Bits a backend can report when it does not say otherwise (`0o600`)
    pub const DEFAULT_GET_MASK: Self = Self::OWNER_READ.union(Self::OWNER_WRITE);

    /// Bits a backend can change when it does not say otherwise (none)
    pub const DEFAULT_SET_MASK: Self = Self::empty();

    /// Single cell of the matrix
    pub const fn bit(access: AccessClass, permission: PermissionType) -> Self {
        Self::from_bits_truncate(permission.bit() << access.shift())
    }

    /// Iterate over every (access, permission) cell
    pub fn cells() -> impl Iterator<Item = (AccessClass, PermissionType)> {
        AccessClass::ALL
            .into_iter()
            .flat_map(|a| PermissionType::ALL.into_iter().map(move |p| (a, p)))
    }

    pub const fn has(self, access: AccessClass, permission: PermissionType) -> bool {
        self.contains(Self::bit(access, permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_masks() {
        assert_eq!(PermissionBits::DEFAULT_GET_MASK.bits(), 0o600);
        assert_eq!(PermissionBits::DEFAULT_SET_MASK.bits(), 0);
    }

    #[test]
    fn test_cell_layout() {
        assert_eq!(
            PermissionBits::bit(AccessClass::Owner, PermissionType::Write),
            PermissionBits::OWNER_WRITE
        );
        assert_eq!(
            PermissionBits::bit(AccessClass::Other, PermissionType::Execute).bits(),
            0o001
        );
        assert_eq!(PermissionBits::cells().count(), 9);
        let mode = PermissionBits::from_bits_truncate(0o644);
        assert!(mode.has(AccessClass::Group, PermissionType::Read));
    }
}
