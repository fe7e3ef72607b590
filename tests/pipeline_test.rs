mod common;

use common::{Harness, file_names, write_image};
use image::ImageFormat;
use rust_image_pipeline::models::ReferenceRecord;
use rust_image_pipeline::ItemOutcome;
use rust_image_pipeline::services::storage::ObjectStore;

#[tokio::test]
async fn test_produce_then_consume_scenario() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 100, 60, ImageFormat::Png);
    std::fs::write(dir.path().join("b.png"), vec![0u8; 20_000]).unwrap();

    let h = Harness::bounded(10_000);
    let patterns = Harness::patterns(&["*.png"]);

    // 1. Produce
    let produced = h
        .producer
        .run(dir.path(), &patterns, false, &h.cancel)
        .await
        .unwrap();
    assert_eq!(produced.processed, 2);
    assert_eq!(produced.succeeded, 1);
    assert_eq!(produced.skipped, 1);
    assert_eq!(produced.failed, 0);
    assert_eq!(file_names(dir.path()), vec!["b.png"]);

    let staged = h.store.list(&h.config.staging_container);
    assert_eq!(staged.len(), 1);
    assert!(staged[0].ends_with("-a.png"));

    let bodies = h.queue.bodies(&h.config.queue_name);
    assert_eq!(bodies.len(), 1);
    let record = ReferenceRecord::from_json(&bodies[0]).unwrap();
    assert_eq!(record.original_file_name, "a.png");
    assert_eq!(record.staged_object_name, staged[0]);

    // 2. Consume
    let consumed = h.consumer.run(false, &h.cancel).await.unwrap();
    assert_eq!(consumed.succeeded, 1);
    assert_eq!(consumed.failed, 0);
    assert!(h.queue.is_empty(&h.config.queue_name));
    assert!(h.store.list(&h.config.staging_container).is_empty());
    assert_eq!(h.store.list(&h.config.result_container), vec!["a-50.png"]);

    let published = h.store.object(&h.config.result_container, "a-50.png").unwrap();
    let decoded = image::load_from_memory_with_format(&published.data, ImageFormat::Png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (50, 30));
}

#[tokio::test]
async fn test_in_bounds_files_are_all_staged_and_enqueued() {
    let dir = tempfile::tempdir().unwrap();
    for (i, name) in ["one.png", "two.jpg", "three.gif", "four.bmp"].iter().enumerate() {
        let format = ImageFormat::from_path(name).unwrap();
        write_image(dir.path(), name, 8 + i as u32, 6, format);
    }

    let h = Harness::bounded(1_000_000);
    let result = h
        .producer
        .run(dir.path(), &Harness::patterns(&["*"]), false, &h.cancel)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 4);
    assert!(file_names(dir.path()).is_empty());
    assert_eq!(h.store.list(&h.config.staging_container).len(), 4);
    assert_eq!(h.queue.len(&h.config.queue_name), 4);
}

#[tokio::test]
async fn test_out_of_bounds_files_are_untouched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.png"), b"").unwrap();
    std::fs::write(dir.path().join("huge.png"), vec![7u8; 5_000]).unwrap();

    let h = Harness::bounded(1_000);
    let result = h
        .producer
        .run(dir.path(), &Harness::patterns(&["*.png"]), false, &h.cancel)
        .await
        .unwrap();

    assert_eq!(result.skipped, 2);
    assert_eq!(result.failed, 0);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(file_names(dir.path()), vec!["empty.png", "huge.png"]);
    assert!(h.store.list(&h.config.staging_container).is_empty());
    assert!(h.queue.is_empty(&h.config.queue_name));
}

#[tokio::test]
async fn test_second_consumer_run_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 20, 20, ImageFormat::Png);
    write_image(dir.path(), "b.jpg", 30, 10, ImageFormat::Jpeg);

    let h = Harness::bounded(1_000_000);
    h.producer
        .run(dir.path(), &Harness::patterns(&[]), false, &h.cancel)
        .await
        .unwrap();

    let first = h.consumer.run(false, &h.cancel).await.unwrap();
    assert_eq!(first.succeeded, 2);
    let results_after_first = h.store.snapshot();

    let second = h.consumer.run(false, &h.cancel).await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.exit_code(), 0);
    assert_eq!(h.store.snapshot(), results_after_first);
}

#[tokio::test]
async fn test_output_keeps_format_and_halves_dimensions() {
    let cases = [
        ("wide.png", 101, 7, ImageFormat::Png),
        ("photo.jpeg", 64, 48, ImageFormat::Jpeg),
        ("anim.gif", 10, 30, ImageFormat::Gif),
        ("icon.bmp", 3, 1, ImageFormat::Bmp),
        ("scan.tiff", 40, 22, ImageFormat::Tiff),
    ];

    let dir = tempfile::tempdir().unwrap();
    for (name, w, h, format) in cases {
        write_image(dir.path(), name, w, h, format);
    }

    let harness = Harness::bounded(10_000_000);
    harness
        .producer
        .run(dir.path(), &Harness::patterns(&[]), false, &harness.cancel)
        .await
        .unwrap();
    let consumed = harness.consumer.run(false, &harness.cancel).await.unwrap();
    assert_eq!(consumed.succeeded, cases.len());

    for (name, w, h, format) in cases {
        let (stem, ext) = name.split_once('.').unwrap();
        let output_name = format!("{}-50.{}", stem, ext);
        let published = harness
            .store
            .object(&harness.config.result_container, &output_name)
            .unwrap_or_else(|| panic!("missing {}", output_name));

        assert_eq!(image::guess_format(&published.data).unwrap(), format);
        let decoded = image::load_from_memory_with_format(&published.data, format).unwrap();
        assert_eq!(
            (decoded.width(), decoded.height()),
            ((w / 2).max(1), (h / 2).max(1)),
            "dimensions of {}",
            output_name
        );
    }
}

#[tokio::test]
async fn test_orphaned_message_is_deleted_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "a.png", 10, 10, ImageFormat::Png);
    write_image(dir.path(), "gone.png", 10, 10, ImageFormat::Png);

    let h = Harness::bounded(1_000_000);
    h.producer
        .run(dir.path(), &Harness::patterns(&["*.png"]), false, &h.cancel)
        .await
        .unwrap();

    // Manual cleanup removed one staged object behind the queue's back.
    let gone = h
        .store
        .list(&h.config.staging_container)
        .into_iter()
        .find(|name| name.ends_with("-gone.png"))
        .unwrap();
    h.store.delete(&h.config.staging_container, &gone).await.unwrap();

    let result = h.consumer.run(false, &h.cancel).await.unwrap();
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.exit_code(), 0);
    assert!(result
        .items
        .iter()
        .any(|item| item.name == "gone.png" && item.outcome == ItemOutcome::Orphaned));
    assert!(h.queue.is_empty(&h.config.queue_name));
    assert_eq!(h.store.list(&h.config.result_container), vec!["a-50.png"]);
}

#[tokio::test]
async fn test_failed_item_does_not_stop_the_sweep() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("corrupt.png"), b"this is not an image").unwrap();
    write_image(dir.path(), "fine.png", 12, 12, ImageFormat::Png);

    let h = Harness::bounded(1_000_000);
    h.producer
        .run(dir.path(), &Harness::patterns(&["*.png"]), false, &h.cancel)
        .await
        .unwrap();

    let result = h.consumer.run(false, &h.cancel).await.unwrap();
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.exit_code(), 2);
    assert!(result.errors[0].starts_with("corrupt.png: Decode error"));

    // The failed message stays for redelivery, with its staged object.
    assert_eq!(h.queue.len(&h.config.queue_name), 1);
    assert_eq!(h.store.list(&h.config.staging_container).len(), 1);
    assert_eq!(h.store.list(&h.config.result_container), vec!["fine-50.png"]);
}
