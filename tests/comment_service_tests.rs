// tests/comment_service_tests.rs

use event_comments::{
    error::AppError,
    models::comment::{
        CommentPatch, CommentResponse, CreateComment, NewComment, UpdateComment, UploadedFile,
    },
    repositories::CommentRepository,
    services::thread::ThreadNode,
    testing::InMemoryBackend,
};

const EVENT: i64 = 1;
const OTHER_EVENT: i64 = 2;
const ALICE: i64 = 10;
const BOB: i64 = 20;

/// Helper: backend with two events and two known users.
async fn setup() -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    backend.events.add(EVENT, "Picnic").await;
    backend.events.add(OTHER_EVENT, "Hike").await;
    backend.profiles.add(ALICE, "alice").await;
    backend.profiles.add(BOB, "bob").await;
    backend
}

fn image(name: &str) -> UploadedFile {
    UploadedFile {
        filename: name.to_string(),
        content_type: "image/png".to_string(),
        bytes: vec![7; 16],
    }
}

fn text(text: &str) -> CreateComment {
    CreateComment {
        text: text.to_string(),
        ..Default::default()
    }
}

fn reply(text: &str, parent_id: i64) -> CreateComment {
    CreateComment {
        text: text.to_string(),
        parent_id: Some(parent_id),
        uploads: Vec::new(),
    }
}

fn ids(nodes: &[ThreadNode<CommentResponse>]) -> Vec<i64> {
    nodes.iter().map(|n| n.item.id).collect()
}

#[tokio::test]
async fn reply_chain_stops_at_max_depth() {
    let backend = setup().await;
    let service = &backend.service;

    let c0 = service.create_comment(EVENT, ALICE, text("hi")).await.unwrap();
    let c1 = service
        .create_comment(EVENT, BOB, reply("hello", c0.id))
        .await
        .unwrap();
    let c2 = service
        .create_comment(EVENT, ALICE, reply("depth two", c1.id))
        .await
        .unwrap();
    let c3 = service
        .create_comment(EVENT, BOB, reply("depth three", c2.id))
        .await
        .unwrap();

    assert_eq!((c0.depth, c1.depth, c2.depth, c3.depth), (0, 1, 2, 3));
    assert_eq!(c0.root_id, None);
    // Every reply points at the top-level comment, not at its parent.
    for c in [&c1, &c2, &c3] {
        assert_eq!(c.root_id, Some(c0.id));
    }
    assert_eq!(c3.parent_id, Some(c2.id));

    let err = service
        .create_comment(EVENT, ALICE, reply("too deep", c3.id))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::DepthExceeded {
            depth: 4,
            max_depth: 3
        }
    ));

    let thread = service.get_thread(c0.id).await.unwrap();
    assert_eq!(thread.comment.item.id, c0.id);
    assert_eq!(thread.comment.node_count(), 4);
    assert_eq!(thread.total, 4);
    assert!(thread.detached.is_empty());
    assert_eq!(ids(&thread.comment.replies), vec![c1.id]);
    assert_eq!(ids(&thread.comment.replies[0].replies), vec![c2.id]);
    assert_eq!(ids(&thread.comment.replies[0].replies[0].replies), vec![c3.id]);
}

#[tokio::test]
async fn thread_can_be_fetched_from_any_member() {
    let backend = setup().await;
    let service = &backend.service;

    let root = service.create_comment(EVENT, ALICE, text("root")).await.unwrap();
    let child = service
        .create_comment(EVENT, BOB, reply("child", root.id))
        .await
        .unwrap();
    let other_root = service.create_comment(EVENT, BOB, text("other")).await.unwrap();

    let thread = service.get_thread(child.id).await.unwrap();
    assert_eq!(thread.comment.item.id, root.id);
    assert_eq!(thread.comment.node_count(), 2);
    assert_ne!(thread.comment.item.id, other_root.id);
}

#[tokio::test]
async fn event_listing_nests_replies_in_chronological_order() {
    let backend = setup().await;
    let service = &backend.service;

    let a = service.create_comment(EVENT, ALICE, text("a")).await.unwrap();
    let b = service.create_comment(EVENT, BOB, text("b")).await.unwrap();
    let a1 = service.create_comment(EVENT, BOB, reply("a1", a.id)).await.unwrap();
    let a2 = service.create_comment(EVENT, ALICE, reply("a2", a.id)).await.unwrap();
    let a1x = service.create_comment(EVENT, ALICE, reply("a1x", a1.id)).await.unwrap();
    service.create_comment(OTHER_EVENT, ALICE, text("elsewhere")).await.unwrap();

    let listing = service.get_comments_for_event(EVENT).await.unwrap();

    assert_eq!(listing.total, 5);
    assert_eq!(ids(&listing.comments), vec![a.id, b.id]);
    assert_eq!(ids(&listing.comments[0].replies), vec![a1.id, a2.id]);
    assert_eq!(ids(&listing.comments[0].replies[0].replies), vec![a1x.id]);
    assert!(listing.comments[1].replies.is_empty());
}

#[tokio::test]
async fn event_listing_is_stable_without_writes() {
    let backend = setup().await;
    let service = &backend.service;

    let root = service.create_comment(EVENT, ALICE, text("root")).await.unwrap();
    service.create_comment(EVENT, BOB, reply("r1", root.id)).await.unwrap();
    service.create_comment(EVENT, BOB, text("second root")).await.unwrap();

    let first = service.get_comments_for_event(EVENT).await.unwrap();
    let second = service.get_comments_for_event(EVENT).await.unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[tokio::test]
async fn comments_carry_author_profile() {
    let backend = setup().await;
    let comment = backend
        .service
        .create_comment(EVENT, ALICE, text("hi"))
        .await
        .unwrap();

    let author = comment.author.expect("author projection");
    assert_eq!(author.id, ALICE);
    assert_eq!(author.username, "alice");
}

#[tokio::test]
async fn content_is_required_unless_attachments_present() {
    let backend = setup().await;
    let service = &backend.service;

    let err = service.create_comment(EVENT, ALICE, text("   ")).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let with_image = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: String::new(),
                parent_id: None,
                uploads: vec![image("pic.png")],
            },
        )
        .await
        .unwrap();

    assert_eq!(with_image.text, "");
    assert_eq!(with_image.attachments.len(), 1);
    assert_eq!(with_image.attachments[0].filename, "pic.png");
    assert_eq!(backend.attachments.urls().await.len(), 1);
}

#[tokio::test]
async fn text_is_trimmed_and_bounded() {
    let backend = setup().await;
    let service = &backend.service;

    let comment = service.create_comment(EVENT, ALICE, text("  padded  ")).await.unwrap();
    assert_eq!(comment.text, "padded");

    let err = service
        .create_comment(EVENT, ALICE, text(&"x".repeat(1001)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn create_requires_existing_event_and_parent() {
    let backend = setup().await;
    let service = &backend.service;

    let err = service.create_comment(99, ALICE, text("hi")).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = service
        .create_comment(EVENT, ALICE, reply("orphan", 12345))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let foreign = service
        .create_comment(OTHER_EVENT, ALICE, text("other event"))
        .await
        .unwrap();
    let err = service
        .create_comment(EVENT, ALICE, reply("cross-event", foreign.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn failed_insert_removes_stored_attachments() {
    let backend = setup().await;
    backend.comments.fail_inserts(true);

    let err = backend
        .service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: "with files".to_string(),
                parent_id: None,
                uploads: vec![image("a.png"), image("b.png")],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StoreUnavailable(_)));
    assert!(backend.attachments.urls().await.is_empty());
    assert!(backend.comments.all().await.is_empty());
}

#[tokio::test]
async fn failed_upload_removes_earlier_uploads() {
    let backend = setup().await;
    backend.attachments.fail_stores_after(1);

    let err = backend
        .service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: String::new(),
                parent_id: None,
                uploads: vec![image("a.png"), image("b.png")],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StoreUnavailable(_)));
    assert!(backend.attachments.urls().await.is_empty());
    assert!(backend.comments.all().await.is_empty());
}

#[tokio::test]
async fn rejects_disallowed_uploads_before_storing() {
    let backend = setup().await;
    let mut upload = image("tool.exe");
    upload.content_type = "application/x-msdownload".to_string();

    let err = backend
        .service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: "look".to_string(),
                parent_id: None,
                uploads: vec![upload],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(backend.attachments.urls().await.is_empty());
}

#[tokio::test]
async fn update_appends_attachments_and_marks_edited() {
    let backend = setup().await;
    let service = &backend.service;

    let original = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: "first".to_string(),
                parent_id: None,
                uploads: vec![image("one.png")],
            },
        )
        .await
        .unwrap();
    assert!(original.edited_at.is_none());

    let updated = service
        .update_comment(
            original.id,
            ALICE,
            UpdateComment {
                text: Some("second".to_string()),
                uploads: vec![image("two.png")],
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.text, "second");
    assert!(updated.edited_at.is_some());
    assert_eq!(updated.attachments.len(), 2);
    assert_eq!(updated.attachments[0], original.attachments[0]);
    assert_eq!(updated.attachments[1].filename, "two.png");

    // Blank text keeps what is there.
    let kept = service
        .update_comment(
            original.id,
            ALICE,
            UpdateComment {
                text: Some("   ".to_string()),
                uploads: Vec::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(kept.text, "second");
}

#[tokio::test]
async fn update_respects_attachment_limit() {
    let backend = setup().await;
    let service = &backend.service;

    let comment = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: String::new(),
                parent_id: None,
                uploads: (0..5).map(|i| image(&format!("{i}.png"))).collect(),
            },
        )
        .await
        .unwrap();

    let err = service
        .update_comment(
            comment.id,
            ALICE,
            UpdateComment {
                text: None,
                uploads: vec![image("sixth.png")],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(backend.attachments.urls().await.len(), 5);
}

#[tokio::test]
async fn non_author_cannot_edit() {
    let backend = setup().await;
    let service = &backend.service;

    let comment = service.create_comment(EVENT, ALICE, text("mine")).await.unwrap();

    let err = service
        .update_comment(
            comment.id,
            BOB,
            UpdateComment {
                text: Some("hijacked".to_string()),
                uploads: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let stored = backend
        .comments
        .get_by_id(comment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.text, "mine");
    assert!(stored.edited_at.is_none());

    let err = service.delete_comment(comment.id, BOB).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn delete_keeps_replies_addressable() {
    let backend = setup().await;
    let service = &backend.service;

    let root = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: "root".to_string(),
                parent_id: None,
                uploads: vec![image("root.png")],
            },
        )
        .await
        .unwrap();
    let r1 = service.create_comment(EVENT, BOB, reply("r1", root.id)).await.unwrap();
    let r2 = service.create_comment(EVENT, BOB, reply("r2", root.id)).await.unwrap();

    service.delete_comment(root.id, ALICE).await.unwrap();

    let stored = backend.comments.get_by_id(root.id).await.unwrap().unwrap();
    assert!(stored.is_deleted);
    assert_eq!(stored.text, service.rules().deleted_placeholder);
    assert!(stored.attachments.is_empty());
    assert!(backend.attachments.urls().await.is_empty());

    for id in [r1.id, r2.id] {
        let thread = service.get_thread(id).await.unwrap();
        assert_eq!(thread.comment.item.id, root.id);
        assert!(thread.comment.item.is_deleted);
        assert_eq!(ids(&thread.comment.replies), vec![r1.id, r2.id]);
        assert_eq!(thread.total, 2);
    }
}

#[tokio::test]
async fn listing_hides_deleted_and_surfaces_their_replies() {
    let backend = setup().await;
    let service = &backend.service;

    let root = service.create_comment(EVENT, ALICE, text("root")).await.unwrap();
    let middle = service.create_comment(EVENT, BOB, reply("middle", root.id)).await.unwrap();
    let leaf = service.create_comment(EVENT, ALICE, reply("leaf", middle.id)).await.unwrap();

    service.delete_comment(middle.id, BOB).await.unwrap();

    let listing = service.get_comments_for_event(EVENT).await.unwrap();
    assert_eq!(listing.total, 2);
    assert_eq!(ids(&listing.comments), vec![root.id, leaf.id]);
    assert!(listing.comments[0].replies.is_empty());
}

#[tokio::test]
async fn deleted_comments_are_terminal() {
    let backend = setup().await;
    let service = &backend.service;

    let comment = service.create_comment(EVENT, ALICE, text("bye")).await.unwrap();
    service.delete_comment(comment.id, ALICE).await.unwrap();

    let err = service.delete_comment(comment.id, ALICE).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err = service
        .update_comment(
            comment.id,
            ALICE,
            UpdateComment {
                text: Some("back".to_string()),
                uploads: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn delete_proceeds_when_file_removal_fails() {
    let backend = setup().await;
    let service = &backend.service;

    let comment = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: "files".to_string(),
                parent_id: None,
                uploads: vec![image("stuck.png")],
            },
        )
        .await
        .unwrap();

    backend.attachments.fail_deletes(true);
    service.delete_comment(comment.id, ALICE).await.unwrap();

    let stored = backend.comments.get_by_id(comment.id).await.unwrap().unwrap();
    assert!(stored.is_deleted);
    assert!(stored.attachments.is_empty());
}

#[tokio::test]
async fn removing_last_attachment_of_empty_comment_is_rejected() {
    let backend = setup().await;
    let service = &backend.service;

    let comment = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: String::new(),
                parent_id: None,
                uploads: vec![image("only.png")],
            },
        )
        .await
        .unwrap();
    let attachment = comment.attachments[0].clone();

    let err = service
        .remove_attachment(comment.id, ALICE, attachment.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let stored = backend.comments.get_by_id(comment.id).await.unwrap().unwrap();
    assert_eq!(stored.attachments, vec![attachment.clone()]);
    assert!(stored.edited_at.is_none());
    assert!(backend.attachments.urls().await.contains(&attachment.url));
}

#[tokio::test]
async fn remove_attachment_drops_descriptor_and_file() {
    let backend = setup().await;
    let service = &backend.service;

    let comment = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: "two pics".to_string(),
                parent_id: None,
                uploads: vec![image("a.png"), image("b.png")],
            },
        )
        .await
        .unwrap();
    let (first, second) = (comment.attachments[0].clone(), comment.attachments[1].clone());

    let err = service
        .remove_attachment(comment.id, BOB, first.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = service
        .remove_attachment(comment.id, ALICE, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let updated = service
        .remove_attachment(comment.id, ALICE, first.id)
        .await
        .unwrap();

    assert_eq!(updated.attachments, vec![second.clone()]);
    assert!(updated.edited_at.is_some());

    let urls = backend.attachments.urls().await;
    assert!(!urls.contains(&first.url));
    assert!(urls.contains(&second.url));
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let backend = setup().await;
    let comment = backend
        .service
        .create_comment(EVENT, ALICE, text("v1"))
        .await
        .unwrap();

    let stored = backend.comments.get_by_id(comment.id).await.unwrap().unwrap();
    let patch = CommentPatch {
        text: Some("first writer".to_string()),
        ..Default::default()
    };
    backend
        .comments
        .update(stored.id, patch, stored.version)
        .await
        .unwrap();

    let patch = CommentPatch {
        text: Some("second writer".to_string()),
        ..Default::default()
    };
    let err = backend
        .comments
        .update(stored.id, patch, stored.version)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = backend
        .comments
        .update(9999, CommentPatch::default(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn sweep_removes_only_unreferenced_files() {
    let backend = setup().await;
    let service = &backend.service;

    let kept = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: String::new(),
                parent_id: None,
                uploads: vec![image("kept.png")],
            },
        )
        .await
        .unwrap();
    let stray = backend.attachments.plant("stray.png").await;

    let removed = service.sweep_orphaned_attachments().await.unwrap();

    assert_eq!(removed, 1);
    let urls = backend.attachments.urls().await;
    assert!(!urls.contains(&stray));
    assert!(urls.contains(&kept.attachments[0].url));
}

#[tokio::test]
async fn missing_comment_is_not_found() {
    let backend = setup().await;
    let service = &backend.service;

    assert!(matches!(service.get_thread(404).await, Err(AppError::NotFound(_))));
    assert!(matches!(
        service.delete_comment(404, ALICE).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        service.get_comments_for_event(404).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn stored_text_stays_within_limit_and_reads_back_as_typed() {
    let backend = setup().await;
    let service = &backend.service;
    let max = service.rules().max_text_length;

    let ampersands = service
        .create_comment(EVENT, ALICE, text(&"&".repeat(max)))
        .await
        .unwrap();
    let stored = backend.comments.get_by_id(ampersands.id).await.unwrap().unwrap();
    assert_eq!(stored.text.chars().count(), max);

    let plain = service
        .create_comment(EVENT, ALICE, text("Tom & Jerry: a < b"))
        .await
        .unwrap();
    assert_eq!(plain.text, "Tom & Jerry: a < b");

    let err = service
        .create_comment(EVENT, ALICE, text(&"<".repeat(max + 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn repository_rejects_records_beyond_limits() {
    let backend = setup().await;
    let root = backend
        .service
        .create_comment(EVENT, ALICE, text("root"))
        .await
        .unwrap();

    let too_deep = NewComment {
        event_id: EVENT,
        author_id: ALICE,
        text: "hand built".to_string(),
        parent_id: Some(root.id),
        root_id: Some(root.id),
        depth: 7,
        attachments: Vec::new(),
    };
    let err = backend.comments.insert(too_deep.clone()).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let too_long = NewComment {
        depth: 1,
        text: "x".repeat(1001),
        ..too_deep
    };
    let err = backend.comments.insert(too_long).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    assert_eq!(backend.comments.all().await.len(), 1);
}

#[tokio::test]
async fn failed_update_removes_newly_stored_attachments() {
    let backend = setup().await;
    let service = &backend.service;

    let comment = service
        .create_comment(
            EVENT,
            ALICE,
            CreateComment {
                text: "has one".to_string(),
                parent_id: None,
                uploads: vec![image("first.png")],
            },
        )
        .await
        .unwrap();
    let before = backend.attachments.urls().await;

    backend.comments.fail_updates(true);
    let err = service
        .update_comment(
            comment.id,
            ALICE,
            UpdateComment {
                text: Some("and another".to_string()),
                uploads: vec![image("second.png")],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StoreUnavailable(_)));
    assert_eq!(backend.attachments.urls().await, before);

    let stored = backend.comments.get_by_id(comment.id).await.unwrap().unwrap();
    assert_eq!(stored.text, "has one");
    assert_eq!(stored.attachments, comment.attachments);
}

#[tokio::test]
async fn created_comment_is_returned_when_profile_lookup_fails() {
    let backend = setup().await;
    backend.profiles.fail_lookups(true);

    let comment = backend
        .service
        .create_comment(EVENT, ALICE, text("still posted"))
        .await
        .unwrap();

    assert!(comment.author.is_none());
    assert_eq!(comment.author_id, ALICE);
    let all = backend.comments.all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, comment.id);
}
