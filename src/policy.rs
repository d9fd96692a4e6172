//! Who may do what. Every check the chat service makes goes through
//! [`authorize`], which looks only at its arguments.

use std::{collections::BTreeSet, fmt};

use crate::model::{Identity, Message, Role, UserId};

pub type Actor = Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    Conversation { participants: &'a BTreeSet<UserId> },
    Message(&'a Message),
    User(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Post,
    ManageParticipants,
    Edit,
    Delete,
    MarkRead,
    Purge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotParticipant,
    NotSender,
    NotSenderOrAdmin,
    NotReceiver,
    NotSelfOrAdmin,
    /// The action makes no sense for the resource kind.
    Unsupported,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DenyReason::*;
        f.write_str(match self {
            NotParticipant => "requester is not a participant of the conversation",
            NotSender => "only the sender may do this",
            NotSenderOrAdmin => "only the sender or an admin may do this",
            NotReceiver => "only the receiver may do this",
            NotSelfOrAdmin => "only the account owner or an admin may do this",
            Unsupported => "action does not apply to this resource",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    fn allow_if(ok: bool, reason: DenyReason) -> Self {
        if ok { Decision::Allow } else { Decision::Deny(reason) }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

pub fn authorize(actor: &Actor, resource: Resource<'_>, action: Action) -> Decision {
    use Action::*;
    use DenyReason::*;

    let admin = actor.role == Role::Admin;
    match (resource, action) {
        (Resource::Conversation { participants }, Read | Post) => {
            Decision::allow_if(participants.contains(&actor.id), NotParticipant)
        }
        (Resource::Conversation { participants }, ManageParticipants) => {
            Decision::allow_if(admin || participants.contains(&actor.id), NotParticipant)
        }
        (Resource::Message(message), Edit) => {
            Decision::allow_if(message.sender == actor.id, NotSender)
        }
        (Resource::Message(message), Delete) => {
            Decision::allow_if(admin || message.sender == actor.id, NotSenderOrAdmin)
        }
        (Resource::Message(message), MarkRead) => {
            Decision::allow_if(message.receiver == actor.id, NotReceiver)
        }
        (Resource::User(user), Purge) => Decision::allow_if(admin || user == actor.id, NotSelfOrAdmin),
        _ => Decision::Deny(Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationId, MessageId, Timestamp};

    fn actor(role: Role) -> Actor {
        Identity {
            id: UserId::new(),
            role,
        }
    }

    fn message_from(sender: UserId, receiver: UserId) -> Message {
        Message {
            id: MessageId::new(),
            conversation: ConversationId::new(),
            sender,
            receiver,
            body: "hi".into(),
            created_at: Timestamp::now(),
            edited: None,
            read: false,
            parent: None,
        }
    }

    #[test]
    fn participants_read_and_post() {
        let member = actor(Role::Guest);
        let outsider = actor(Role::Admin);
        let participants = BTreeSet::from([member.id, UserId::new()]);
        let convo = Resource::Conversation {
            participants: &participants,
        };

        assert!(authorize(&member, convo, Action::Read).is_allowed());
        assert!(authorize(&member, convo, Action::Post).is_allowed());
        // admins manage membership but do not read other people's conversations
        assert_eq!(
            authorize(&outsider, convo, Action::Read),
            Decision::Deny(DenyReason::NotParticipant)
        );
        assert!(authorize(&outsider, convo, Action::ManageParticipants).is_allowed());
    }

    #[test]
    fn only_sender_edits() {
        let sender = actor(Role::Guest);
        let admin = actor(Role::Admin);
        let message = message_from(sender.id, UserId::new());

        assert!(authorize(&sender, Resource::Message(&message), Action::Edit).is_allowed());
        assert_eq!(
            authorize(&admin, Resource::Message(&message), Action::Edit),
            Decision::Deny(DenyReason::NotSender)
        );
    }

    #[test]
    fn sender_or_admin_deletes() {
        let sender = actor(Role::Host);
        let admin = actor(Role::Admin);
        let host = actor(Role::Host);
        let message = message_from(sender.id, host.id);

        assert!(authorize(&sender, Resource::Message(&message), Action::Delete).is_allowed());
        assert!(authorize(&admin, Resource::Message(&message), Action::Delete).is_allowed());
        assert_eq!(
            authorize(&host, Resource::Message(&message), Action::Delete),
            Decision::Deny(DenyReason::NotSenderOrAdmin)
        );
    }

    #[test]
    fn receiver_marks_read() {
        let sender = actor(Role::Guest);
        let receiver = actor(Role::Guest);
        let message = message_from(sender.id, receiver.id);

        assert!(authorize(&receiver, Resource::Message(&message), Action::MarkRead).is_allowed());
        assert_eq!(
            authorize(&sender, Resource::Message(&message), Action::MarkRead),
            Decision::Deny(DenyReason::NotReceiver)
        );
    }

    #[test]
    fn purge_self_or_admin() {
        let user = actor(Role::Guest);
        let other = actor(Role::Host);
        let admin = actor(Role::Admin);

        assert!(authorize(&user, Resource::User(user.id), Action::Purge).is_allowed());
        assert!(authorize(&admin, Resource::User(user.id), Action::Purge).is_allowed());
        assert!(!authorize(&other, Resource::User(user.id), Action::Purge).is_allowed());
    }

    #[test]
    fn mismatched_action_is_denied() {
        let user = actor(Role::Admin);
        assert_eq!(
            authorize(&user, Resource::User(user.id), Action::Edit),
            Decision::Deny(DenyReason::Unsupported)
        );
    }
}
