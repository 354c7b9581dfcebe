use super::{locate_object, missing, Decode, Fields, RawPayload, ResourceShape};
use crate::error::DecodeFailure;
use crate::model::{
    Message, MessageId, Thread, ThreadId, ThreadListing, ThreadParticipant, UnreadCounts,
    UserId,
};

const ID: &[&str] = &["_id", "id"];

impl Decode for Thread {
    const SHAPE: ResourceShape = ResourceShape::Thread;

    fn decode_item(f: Fields<'_>) -> Result<Self, DecodeFailure> {
        let id = f
            .string(&["_id", "id", "threadId"])
            .ok_or_else(|| missing(Self::SHAPE, "id"))?;

        let participant_ids = f
            .array(&["participants", "participantIds"])
            .map(|items| {
                items
                    .iter()
                    .filter_map(|p| match p {
                        serde_json::Value::Object(obj) => Fields::new(obj).string(ID),
                        serde_json::Value::String(s) if !s.trim().is_empty() => {
                            Some(s.trim().to_string())
                        }
                        _ => None,
                    })
                    .map(UserId)
                    .collect()
            })
            .unwrap_or_default();

        let unread_count = f
            .count(&["unreadCount", "unread_count", "unread"])
            .unwrap_or(0);
        let is_unread = f
            .boolean(&["unread", "isUnread", "hasUnread"])
            .unwrap_or(unread_count > 0);

        Ok(Self {
            id: ThreadId(id),
            participant_ids,
            counterpart: f
                .object(&["opponent", "participant", "otherUser", "counterpart"])
                .map(decode_participant),
            listing: f.object(&["listing", "property"]).map(decode_thread_listing),
            last_message: f
                .object(&["lastMessage", "last_message"])
                .and_then(|m| Message::decode_item(m).ok()),
            unread_count,
            is_unread,
            updated_at: f.string(&["updatedAt", "updated_at", "lastMessageAt"]),
        })
    }
}

fn decode_participant(f: Fields<'_>) -> ThreadParticipant {
    ThreadParticipant {
        id: f.string(ID).map(UserId),
        name: f.person_name(),
        avatar_url: f.string(&["avatar", "profileImage", "profile_image", "photo"]),
    }
}

fn decode_thread_listing(f: Fields<'_>) -> ThreadListing {
    ThreadListing {
        id: f.string(ID).map(crate::model::ListingId),
        title: f.string(&["title", "name"]),
        image_url: f
            .string(&["image", "imageUrl", "thumbnail"])
            .or_else(|| f.strings(&["images"]).into_iter().next()),
    }
}

impl Decode for Message {
    const SHAPE: ResourceShape = ResourceShape::Message;

    fn decode_item(f: Fields<'_>) -> Result<Self, DecodeFailure> {
        let id = f.string(ID).ok_or_else(|| missing(Self::SHAPE, "id"))?;
        let sender = f.object(&["sender", "from", "user"]);

        Ok(Self {
            id: MessageId(id),
            thread_id: f.reference_id(&["threadId", "thread_id", "thread"]).map(ThreadId),
            text: f.string_or(&["text", "content", "body"], ""),
            sender_id: f
                .string(&["senderId", "sender_id"])
                .or_else(|| f.reference_id(&["sender", "from"]))
                .map(UserId),
            sender_name: sender
                .and_then(|s| s.person_name())
                .or_else(|| f.string(&["senderName", "sender_name"]))
                .unwrap_or_else(|| "User".into()),
            created_at: f.string(&["createdAt", "timestamp", "created_at", "sentAt"]),
            attachments: f.strings(&["attachments", "images"]),
            is_read: f.boolean(&["read", "isRead", "is_read"]).unwrap_or(false),
        })
    }
}

/// `{guestUnread, hostUnread}` or `{guest, host}`, optionally under `data`. Missing counts are zero.
pub fn decode_unread_counts(raw: &RawPayload) -> Result<UnreadCounts, DecodeFailure> {
    let obj = locate_object(raw, &["counts", "unread"])
        .ok_or_else(|| DecodeFailure::malformed("unread counts payload is not an object"))?;
    let f = Fields::new(obj);
    Ok(UnreadCounts {
        guest: f.count(&["guestUnread", "guest_unread", "guest"]).unwrap_or(0),
        host: f.count(&["hostUnread", "host_unread", "host"]).unwrap_or(0),
    })
}

/// Id of a thread returned by the create-thread endpoint.
pub fn decode_created_thread_id(raw: &RawPayload) -> Result<ThreadId, DecodeFailure> {
    let obj = locate_object(raw, &["thread"])
        .ok_or_else(|| DecodeFailure::malformed("thread payload is not an object"))?;
    Fields::new(obj)
        .string(&["_id", "id", "threadId"])
        .map(ThreadId)
        .ok_or_else(|| missing(ResourceShape::Thread, "id"))
}
