#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use rust_image_pipeline::services::queue::MemoryQueueService;
use rust_image_pipeline::services::storage::MemoryObjectStore;
use rust_image_pipeline::utils::validation::NamePatterns;
use rust_image_pipeline::{Consumer, PipelineConfig, Producer};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

pub struct Harness {
    pub config: PipelineConfig,
    pub store: Arc<MemoryObjectStore>,
    pub queue: Arc<MemoryQueueService>,
    pub producer: Producer,
    pub consumer: Consumer,
    pub cancel: watch::Receiver<bool>,
    _cancel_tx: watch::Sender<bool>,
}

impl Harness {
    pub fn new(config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryObjectStore::new());
        let queue = Arc::new(MemoryQueueService::new());
        let (cancel_tx, cancel) = watch::channel(false);
        Self {
            producer: Producer::new(store.clone(), queue.clone(), config.clone()),
            consumer: Consumer::new(store.clone(), queue.clone(), config.clone()),
            config,
            store,
            queue,
            cancel,
            _cancel_tx: cancel_tx,
        }
    }

    pub fn bounded(max_file_size: u64) -> Self {
        Self::new(PipelineConfig {
            max_file_size,
            ..PipelineConfig::development()
        })
    }

    pub fn patterns(patterns: &[&str]) -> NamePatterns {
        NamePatterns::new(patterns).unwrap()
    }
}

pub fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 2 % 256) as u8, (y * 3 % 256) as u8, 90u8])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), format)
        .unwrap();
    out
}

pub fn write_image(dir: &Path, name: &str, width: u32, height: u32, format: ImageFormat) {
    std::fs::write(dir.join(name), encode(width, height, format)).unwrap();
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
