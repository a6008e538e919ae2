//! Role Gate: role → permission set.
//!
//! The mapping is a pure function. Talk-scoped decisions combine the global
//! flags with ownership (creator or speaker of record) via [`TalkAccess`].
//!
//! | role | create | edit any | edit own | all rosters | own roster | attendance | reports | users |
//! |---|---|---|---|---|---|---|---|---|
//! | participant | no | no | no | no | no | no | no | no |
//! | speaker | own only | no | yes | no | yes | own talk | own talk | no |
//! | organizer | yes | yes | yes | yes | yes | yes | yes | no |
//! | administrator | yes | yes | yes | yes | yes | yes | yes | yes |

use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// User role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Registers for talks.
    Participant,
    /// Presents talks.
    Speaker,
    /// Runs the event.
    Organizer,
    /// Manages users.
    Administrator,
}

/// A role value that is not one of the four roles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0:?}")]
pub struct UnknownRole(pub String);

impl Role {
    /// All roles, least privileged first.
    pub const ALL: [Self; 4] = [
        Self::Participant,
        Self::Speaker,
        Self::Organizer,
        Self::Administrator,
    ];

    /// Parse a stored or submitted role value.
    ///
    /// Trims and lowercases first. Accepts the legacy values found in older
    /// documents (`participante`, `palestrante`, `organizador`, `administrador`).
    ///
    /// # Errors
    ///
    /// Returns [`UnknownRole`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, UnknownRole> {
        match raw.trim().to_lowercase().as_str() {
            "participant" | "participante" => Ok(Self::Participant),
            "speaker" | "palestrante" => Ok(Self::Speaker),
            "organizer" | "organizador" => Ok(Self::Organizer),
            "administrator" | "administrador" => Ok(Self::Administrator),
            _ => Err(UnknownRole(raw.to_string())),
        }
    }

    /// Canonical stored value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Participant => "participant",
            Self::Speaker => "speaker",
            Self::Organizer => "organizer",
            Self::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A single permission, used to name what a denied caller was missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Create talks.
    CreateTalk,
    /// Edit or delete any talk.
    EditAnyTalk,
    /// Edit talks the caller owns.
    EditOwnTalk,
    /// View every roster.
    ViewAllRosters,
    /// View rosters of owned talks.
    ViewOwnRoster,
    /// Mark attendance.
    MarkAttendance,
    /// View reports.
    ViewReports,
    /// Manage users and roles.
    ManageUsers,
}

impl Permission {
    /// Stable name used in error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTalk => "canCreateTalk",
            Self::EditAnyTalk => "canEditAnyTalk",
            Self::EditOwnTalk => "canEditOwnTalk",
            Self::ViewAllRosters => "canViewAllRosters",
            Self::ViewOwnRoster => "canViewOwnRoster",
            Self::MarkAttendance => "canMarkAttendance",
            Self::ViewReports => "canViewReports",
            Self::ManageUsers => "canManageUsers",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global permission flags for a role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct Permissions {
    /// May create talks (speakers: only with themselves as speaker).
    pub can_create_talk: bool,
    /// May edit and delete any talk.
    pub can_edit_any_talk: bool,
    /// May edit talks they own.
    pub can_edit_own_talk: bool,
    /// May view every roster.
    pub can_view_all_rosters: bool,
    /// May view rosters of owned talks.
    pub can_view_own_roster: bool,
    /// May mark attendance on any talk.
    pub can_mark_attendance: bool,
    /// May view reports for all talks.
    pub can_view_reports: bool,
    /// May manage users and roles.
    pub can_manage_users: bool,
}

impl Permissions {
    /// Least-privileged set: everything denied.
    pub const NONE: Self = Self {
        can_create_talk: false,
        can_edit_any_talk: false,
        can_edit_own_talk: false,
        can_view_all_rosters: false,
        can_view_own_roster: false,
        can_mark_attendance: false,
        can_view_reports: false,
        can_manage_users: false,
    };

    /// Whether the flag for `permission` is set.
    #[must_use]
    pub const fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::CreateTalk => self.can_create_talk,
            Permission::EditAnyTalk => self.can_edit_any_talk,
            Permission::EditOwnTalk => self.can_edit_own_talk,
            Permission::ViewAllRosters => self.can_view_all_rosters,
            Permission::ViewOwnRoster => self.can_view_own_roster,
            Permission::MarkAttendance => self.can_mark_attendance,
            Permission::ViewReports => self.can_view_reports,
            Permission::ManageUsers => self.can_manage_users,
        }
    }

    /// Fail with `PermissionDenied` unless `permission` is granted.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::PermissionDenied`] naming the missing permission.
    pub const fn require(&self, permission: Permission) -> Result<(), DomainError> {
        if self.allows(permission) {
            Ok(())
        } else {
            Err(DomainError::PermissionDenied { permission })
        }
    }

    /// Resolve talk-scoped access given whether the caller owns the talk.
    #[must_use]
    pub const fn for_talk(&self, owns: bool) -> TalkAccess {
        TalkAccess {
            can_edit: self.can_edit_any_talk || (owns && self.can_edit_own_talk),
            can_delete: self.can_edit_any_talk,
            can_view_roster: self.can_view_all_rosters || (owns && self.can_view_own_roster),
            can_mark_attendance: self.can_mark_attendance || (owns && self.can_edit_own_talk),
            can_view_report: self.can_view_reports || (owns && self.can_view_own_roster),
        }
    }
}

/// Permissions for one role.
///
/// Deterministic and total over [`Role`].
#[must_use]
pub const fn permissions_for(role: Role) -> Permissions {
    match role {
        Role::Participant => Permissions::NONE,
        Role::Speaker => Permissions {
            can_create_talk: true,
            can_edit_any_talk: false,
            can_edit_own_talk: true,
            can_view_all_rosters: false,
            can_view_own_roster: true,
            can_mark_attendance: false,
            can_view_reports: false,
            can_manage_users: false,
        },
        Role::Organizer => Permissions {
            can_create_talk: true,
            can_edit_any_talk: true,
            can_edit_own_talk: true,
            can_view_all_rosters: true,
            can_view_own_roster: true,
            can_mark_attendance: true,
            can_view_reports: true,
            can_manage_users: false,
        },
        Role::Administrator => Permissions {
            can_create_talk: true,
            can_edit_any_talk: true,
            can_edit_own_talk: true,
            can_view_all_rosters: true,
            can_view_own_roster: true,
            can_mark_attendance: true,
            can_view_reports: true,
            can_manage_users: true,
        },
    }
}

/// Permissions for a raw stored role value.
///
/// Unknown values get [`Permissions::NONE`], never elevated access.
#[must_use]
pub fn permissions_for_raw(raw: &str) -> Permissions {
    Role::parse(raw).map_or(Permissions::NONE, permissions_for)
}

/// Talk-scoped access, from [`Permissions::for_talk`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct TalkAccess {
    /// May edit fields and materials.
    pub can_edit: bool,
    /// May delete the talk and remove other participants.
    pub can_delete: bool,
    /// May view the roster.
    pub can_view_roster: bool,
    /// May set attendance flags.
    pub can_mark_attendance: bool,
    /// May view the talk's report.
    pub can_view_report: bool,
}

impl TalkAccess {
    /// # Errors
    ///
    /// `PermissionDenied` naming [`Permission::EditOwnTalk`].
    pub const fn require_edit(&self) -> Result<(), DomainError> {
        gate(self.can_edit, Permission::EditOwnTalk)
    }

    /// # Errors
    ///
    /// `PermissionDenied` naming [`Permission::EditAnyTalk`].
    pub const fn require_delete(&self) -> Result<(), DomainError> {
        gate(self.can_delete, Permission::EditAnyTalk)
    }

    /// # Errors
    ///
    /// `PermissionDenied` naming [`Permission::ViewOwnRoster`].
    pub const fn require_roster(&self) -> Result<(), DomainError> {
        gate(self.can_view_roster, Permission::ViewOwnRoster)
    }

    /// # Errors
    ///
    /// `PermissionDenied` naming [`Permission::MarkAttendance`].
    pub const fn require_attendance(&self) -> Result<(), DomainError> {
        gate(self.can_mark_attendance, Permission::MarkAttendance)
    }
}

const fn gate(allowed: bool, permission: Permission) -> Result<(), DomainError> {
    if allowed {
        Ok(())
    } else {
        Err(DomainError::PermissionDenied { permission })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_participant_has_nothing() {
        assert_eq!(permissions_for(Role::Participant), Permissions::NONE);
    }

    #[test]
    fn test_only_administrator_manages_users() {
        for role in Role::ALL {
            assert_eq!(
                permissions_for(role).can_manage_users,
                role == Role::Administrator
            );
        }
    }

    #[test]
    fn test_speaker_scoped_to_own_talks() {
        let speaker = permissions_for(Role::Speaker);
        let own = speaker.for_talk(true);
        let other = speaker.for_talk(false);

        assert!(own.can_edit && own.can_view_roster && own.can_mark_attendance && own.can_view_report);
        assert!(!own.can_delete);
        assert_eq!(other, TalkAccess {
            can_edit: false,
            can_delete: false,
            can_view_roster: false,
            can_mark_attendance: false,
            can_view_report: false,
        });
    }

    #[test]
    fn test_organizer_access_ignores_ownership() {
        let organizer = permissions_for(Role::Organizer);
        assert_eq!(organizer.for_talk(true), organizer.for_talk(false));
        assert!(organizer.for_talk(false).can_delete);
    }

    #[test]
    fn test_parse_normalizes_and_accepts_legacy_values() {
        assert_eq!(Role::parse("  Organizer "), Ok(Role::Organizer));
        assert_eq!(Role::parse("ADMINISTRADOR"), Ok(Role::Administrator));
        assert_eq!(Role::parse("palestrante"), Ok(Role::Speaker));
        assert_eq!(Role::parse("participante"), Ok(Role::Participant));
        assert!(Role::parse("superuser").is_err());
        assert!(Role::parse("admin").is_err());
        assert!(Role::parse("").is_err());
    }

    #[test]
    fn test_require_names_missing_permission() {
        let err = permissions_for(Role::Speaker)
            .require(Permission::ViewReports)
            .expect_err("speaker lacks global reports");
        assert!(matches!(
            err,
            DomainError::PermissionDenied { permission: Permission::ViewReports }
        ));
    }

    proptest! {
        #[test]
        fn prop_unknown_roles_are_least_privileged(raw in "[a-zA-Z ]{0,16}") {
            let perms = permissions_for_raw(&raw);
            match Role::parse(&raw) {
                Ok(role) => prop_assert_eq!(perms, permissions_for(role)),
                Err(_) => prop_assert_eq!(perms, Permissions::NONE),
            }
        }

        #[test]
        fn prop_parse_round_trips_canonical_names(idx in 0usize..4, pad in " {0,3}") {
            let role = Role::ALL[idx];
            let raw = format!("{pad}{}{pad}", role.as_str().to_uppercase());
            prop_assert_eq!(Role::parse(&raw), Ok(role));
        }
    }
}
