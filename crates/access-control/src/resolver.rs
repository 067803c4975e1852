//! The ordered-rule access resolver.
//!
//! Grant rules are evaluated in fixed precedence order; the first rule that
//! matches decides the level. Action gates are applied afterwards: edit-level
//! actions require at least `Edit`, and broadcast control additionally
//! requires a controlling role. Edit access to content deliberately does not
//! imply control over live infrastructure.

use crate::models::{
    AccessDecision, AccessLevel, AccessSnapshot, Action, InvitationStatus, Principal, Role,
};

/// A single grant rule: matches or passes to the next rule.
type GrantRule = fn(&Principal, &AccessSnapshot) -> Option<(AccessLevel, &'static str)>;

/// Grant rules in precedence order. First match wins.
const GRANT_RULES: &[GrantRule] = &[
    rule_admin,
    rule_owner,
    rule_assigned_director,
    rule_accepted_invitation,
    rule_follower,
    rule_public_memorial,
];

fn rule_admin(principal: &Principal, _: &AccessSnapshot) -> Option<(AccessLevel, &'static str)> {
    principal
        .has_admin_privileges()
        .then_some((AccessLevel::Admin, "admin privileges"))
}

fn rule_owner(
    principal: &Principal,
    snapshot: &AccessSnapshot,
) -> Option<(AccessLevel, &'static str)> {
    (principal.id == snapshot.owner_id).then_some((AccessLevel::Admin, "owner"))
}

fn rule_assigned_director(
    principal: &Principal,
    snapshot: &AccessSnapshot,
) -> Option<(AccessLevel, &'static str)> {
    (principal.role == Role::FuneralDirector
        && snapshot.assigned_director_id == Some(principal.id))
    .then_some((AccessLevel::Edit, "assigned funeral director"))
}

fn rule_accepted_invitation(
    principal: &Principal,
    snapshot: &AccessSnapshot,
) -> Option<(AccessLevel, &'static str)> {
    if principal.role != Role::FamilyMember {
        return None;
    }
    let invitation = snapshot.invitation.as_ref()?;
    (invitation.status == InvitationStatus::Accepted
        && invitation.role_to_assign == Role::FamilyMember)
        .then_some((AccessLevel::Edit, "accepted family invitation"))
}

fn rule_follower(
    principal: &Principal,
    snapshot: &AccessSnapshot,
) -> Option<(AccessLevel, &'static str)> {
    (principal.role == Role::Viewer && snapshot.is_follower)
        .then_some((AccessLevel::View, "follower"))
}

fn rule_public_memorial(
    principal: &Principal,
    snapshot: &AccessSnapshot,
) -> Option<(AccessLevel, &'static str)> {
    // An unset flag counts as public; only an explicit `false` hides it.
    (principal.role == Role::Viewer && snapshot.is_public != Some(false))
        .then_some((AccessLevel::View, "public memorial"))
}

/// Roles allowed to start or stop a broadcast, regardless of level.
const BROADCAST_CONTROL_ROLES: &[Role] = &[Role::Owner, Role::FuneralDirector, Role::Admin];

/// Resolve `(principal, snapshot, action)` to an access decision.
///
/// Pure and total: the same inputs always produce the same decision.
#[must_use]
pub fn resolve(principal: &Principal, snapshot: &AccessSnapshot, action: Action) -> AccessDecision {
    let Some((level, reason)) = GRANT_RULES
        .iter()
        .find_map(|rule| rule(principal, snapshot))
    else {
        return AccessDecision::denied("insufficient permissions");
    };

    let granted = match action {
        Action::View => level >= AccessLevel::View,
        Action::EditContent => level >= AccessLevel::Edit,
        // Double gate: edit access to content does not imply control over
        // live infrastructure.
        Action::ControlBroadcast => {
            level >= AccessLevel::Edit
                && (principal.is_admin || BROADCAST_CONTROL_ROLES.contains(&principal.role))
        }
    };

    if granted {
        AccessDecision {
            granted: true,
            level,
            reason,
        }
    } else {
        tracing::debug!(
            target: "access.resolver",
            memorial_id = %snapshot.memorial_id,
            action = ?action,
            level = ?level,
            "Action denied at resolved level"
        );
        AccessDecision::denied("insufficient permissions")
    }
}
