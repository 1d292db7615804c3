// Batch image compressor: presets or custom quality, per-image results,
// single or bundled (.zip) downloads
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod archive;
mod compression;
mod config;
mod estimate;
mod records;

use compression::{CompressRequest, CompressResponse, OutputFormat};
use config::AppConfig;
use estimate::QualityPreset;
use records::{RecordId, RecordState, SessionStore};

use iced::font::{Family, Weight};
use iced::widget::{
    button, column, container, pick_list, radio, row, scrollable, slider, text, Image, Space,
};
use iced::{executor, Alignment, Application, Command, Element, Font, Length, Settings, Theme};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const HEADING_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Bold,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const BODY_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Normal,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

// Formats offered in the UI; the compression call itself also accepts AVIF.
const FORMAT_OPTIONS: [OutputFormat; 4] = [
    OutputFormat::Original,
    OutputFormat::Jpeg,
    OutputFormat::Png,
    OutputFormat::WebP,
];

pub fn main() -> iced::Result {
    BatchCompressor::run(Settings {
        window: iced::window::Settings {
            size: (640, 760),
            min_size: Some((560, 640)),
            resizable: true,
            decorations: true,
            ..Default::default()
        },
        default_font: BODY_FONT,
        default_text_size: 14.0,
        ..Default::default()
    })
}

struct BatchCompressor {
    store: SessionStore,
    preset: QualityPreset,
    quality: u8,
    format: OutputFormat,
    /// In-flight limit for a running batch; 1 means strictly sequential.
    workers: usize,
    queue: VecDeque<RecordId>,
    in_flight: usize,
    status_message: String,
    last_saved: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct LoadedFile {
    path: PathBuf,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
enum Message {
    AddFiles,
    AddFolder,
    FilesLoaded(Vec<LoadedFile>),
    PresetPicked(QualityPreset),
    QualityChanged(u8),
    FormatPicked(OutputFormat),
    StartBatch,
    ItemFinished(RecordId, Result<CompressResponse, String>),
    RemoveRecord(RecordId),
    ClearAll,
    DownloadRecord(RecordId),
    DownloadArchive,
    SaveFinished(Result<Option<PathBuf>, String>),
    OpenSaveLocation,
}

impl Application for BatchCompressor {
    type Message = Message;
    type Theme = Theme;
    type Executor = executor::Default;
    type Flags = ();

    fn new(_flags: ()) -> (Self, Command<Message>) {
        let config = AppConfig::load();
        let app = BatchCompressor {
            store: SessionStore::default(),
            preset: config.preset,
            quality: config.quality.clamp(10, 100),
            format: config.format,
            workers: config.workers.max(1),
            queue: VecDeque::new(),
            in_flight: 0,
            status_message: String::new(),
            last_saved: None,
        };
        (app, Command::none())
    }

    fn title(&self) -> String {
        String::from("Batch Image Compressor")
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::AddFiles => {
                return Command::perform(pick_files(), Message::FilesLoaded);
            }
            Message::AddFolder => {
                return Command::perform(pick_folder(), Message::FilesLoaded);
            }
            Message::FilesLoaded(files) => {
                let added = files.len();
                for file in files {
                    self.store
                        .insert(&file.path, file.bytes, self.preset, self.quality);
                }
                if added > 0 {
                    self.status_message = format!("Added {} images", added);
                }
            }
            Message::PresetPicked(preset) => {
                self.preset = preset;
                self.store.reestimate(self.preset, self.quality);
            }
            Message::QualityChanged(value) => {
                self.quality = value;
                self.store.reestimate(self.preset, self.quality);
            }
            Message::FormatPicked(format) => {
                self.format = format;
            }
            Message::StartBatch => {
                if self.batch_running() {
                    return Command::none();
                }
                self.queue = self.store.mark_compressing().into();
                if self.queue.is_empty() {
                    self.status_message = String::from("Nothing to compress");
                    return Command::none();
                }
                self.status_message = format!("Compressing {} images...", self.queue.len());
                return self.dispatch_next();
            }
            Message::ItemFinished(id, outcome) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                match outcome {
                    Ok(response) => {
                        self.store.set_state(id, RecordState::Done(response));
                    }
                    Err(message) => {
                        eprintln!("compression failed for record {}: {}", id, message);
                        self.store.set_state(id, RecordState::Error(message));
                    }
                }
                if self.queue.is_empty() && self.in_flight == 0 {
                    let done = self.store.done_count();
                    let failed = self.store.error_count();
                    self.status_message =
                        format!("Batch finished: {} compressed, {} failed", done, failed);
                    println!("batch finished: done={}, failed={}", done, failed);
                    return Command::none();
                }
                return self.dispatch_next();
            }
            Message::RemoveRecord(id) => {
                if !self.store.remove(id) {
                    self.status_message =
                        String::from("Cannot remove an image while it is being compressed");
                }
            }
            Message::ClearAll => {
                if self.store.clear() {
                    self.status_message.clear();
                } else {
                    self.status_message =
                        String::from("Cannot clear the session while a batch is running");
                }
            }
            Message::DownloadRecord(id) => {
                if let Some(record) = self.store.get(id) {
                    if let Some(response) = record.response() {
                        let filename =
                            archive::derived_filename(&record.stem, response.result.encoding);
                        let payload = response.result.payload.clone();
                        return Command::perform(
                            save_single(filename, payload),
                            Message::SaveFinished,
                        );
                    }
                }
                // no result yet: silently do nothing
            }
            Message::DownloadArchive => {
                let entries: Vec<(String, String)> = self
                    .store
                    .iter()
                    .filter_map(|record| {
                        record.response().map(|response| {
                            (
                                archive::derived_filename(&record.stem, response.result.encoding),
                                response.result.payload.clone(),
                            )
                        })
                    })
                    .collect();
                if entries.is_empty() {
                    return Command::none();
                }
                return Command::perform(save_archive(entries), Message::SaveFinished);
            }
            Message::SaveFinished(result) => match result {
                Ok(Some(path)) => {
                    self.status_message = format!("Saved {}", path.display());
                    self.last_saved = Some(path);
                }
                Ok(None) => {} // dialog cancelled
                Err(message) => {
                    eprintln!("save failed: {}", message);
                }
            },
            Message::OpenSaveLocation => {
                if let Some(path) = &self.last_saved {
                    let location = path.parent().unwrap_or(Path::new("."));
                    let _ = open::that(location);
                }
            }
        }
        Command::none()
    }

    fn view(&self) -> Element<Message> {
        let title = text("Batch Image Compressor").size(22).font(HEADING_FONT);

        // File selection
        let file_selection = column![
            text("Images").size(16).font(HEADING_FONT),
            row![
                button("Add Images")
                    .on_press(Message::AddFiles)
                    .padding([6, 12]),
                button("Add Folder")
                    .on_press(Message::AddFolder)
                    .padding([6, 12]),
            ]
            .spacing(8),
            if self.store.is_empty() {
                text("No images added").size(12).font(BODY_FONT)
            } else {
                text(format!("{} images in session", self.store.len()))
                    .size(12)
                    .font(BODY_FONT)
            }
        ]
        .spacing(8);

        // Quality and format settings
        let settings = column![
            text("Quality").size(16).font(HEADING_FONT),
            row![
                radio(
                    "High",
                    QualityPreset::High,
                    Some(self.preset),
                    Message::PresetPicked,
                )
                .size(13)
                .spacing(8),
                radio(
                    "Medium",
                    QualityPreset::Medium,
                    Some(self.preset),
                    Message::PresetPicked,
                )
                .size(13)
                .spacing(8),
                radio(
                    "Low",
                    QualityPreset::Low,
                    Some(self.preset),
                    Message::PresetPicked,
                )
                .size(13)
                .spacing(8),
                radio(
                    "Custom",
                    QualityPreset::Custom,
                    Some(self.preset),
                    Message::PresetPicked,
                )
                .size(13)
                .spacing(8),
            ]
            .spacing(16),
            if self.preset == QualityPreset::Custom {
                column![row![
                    text("Quality:").size(13).font(BODY_FONT).width(80),
                    slider(10..=100, self.quality, Message::QualityChanged).width(Length::Fill),
                    text(format!("{}%", self.quality))
                        .size(13)
                        .font(BODY_FONT)
                        .width(40),
                ]
                .spacing(8),]
                .spacing(4)
            } else {
                column![]
            },
            row![
                text("Format:").size(13).font(BODY_FONT).width(80),
                pick_list(&FORMAT_OPTIONS[..], Some(self.format), Message::FormatPicked),
            ]
            .spacing(8)
            .align_items(Alignment::Center),
        ]
        .spacing(8);

        // Action buttons
        let compress_button = if self.batch_running() {
            button("Compressing...").padding([8, 16])
        } else if self.store.pending_count() > 0 {
            button("Compress All")
                .on_press(Message::StartBatch)
                .padding([8, 16])
        } else {
            button("Compress All").padding([8, 16])
        };

        let download_all = if self.store.done_count() > 0 {
            button("Download All (.zip)")
                .on_press(Message::DownloadArchive)
                .padding([8, 16])
        } else {
            button("Download All (.zip)").padding([8, 16])
        };

        let clear_button = if self.store.is_empty() || self.batch_running() {
            button("Clear").padding([8, 16])
        } else {
            button("Clear").on_press(Message::ClearAll).padding([8, 16])
        };

        let actions = row![compress_button, download_all, clear_button].spacing(8);

        // Session totals
        let totals = if self.store.is_empty() {
            column![]
        } else {
            let mut line = format!(
                "{} original → ~{} projected",
                format_size(self.store.original_bytes()),
                format_size(self.store.projected_bytes()),
            );
            if self.store.done_count() > 0 {
                line.push_str(&format!(
                    ", {} compressed",
                    format_size(self.store.compressed_bytes())
                ));
                if let Some(reduction) = self.store.overall_reduction() {
                    line.push_str(&format!(" ({:.0}% smaller)", reduction));
                }
            }
            column![text(line).size(13).font(BODY_FONT)]
        };

        // Per-image rows
        let record_list = if self.store.is_empty() {
            column![]
        } else {
            let rows: Vec<Element<Message>> = self
                .store
                .iter()
                .map(|record| {
                    let thumbnail = Image::new(record.preview.clone()).width(40).height(40);

                    let detail = match &record.state {
                        RecordState::Pending => text(format!(
                            "{} → ~{} estimated",
                            format_size(record.source_bytes),
                            format_size(record.estimated_bytes),
                        ))
                        .size(12)
                        .font(BODY_FONT),
                        RecordState::Compressing => {
                            text("compressing...").size(12).font(BODY_FONT)
                        }
                        RecordState::Done(response) => text(format!(
                            "{} → {} ({:.2}% smaller, {})",
                            format_size(record.source_bytes),
                            format_size(response.result.bytes),
                            response.ratio,
                            response.result.encoding.extension(),
                        ))
                        .size(12)
                        .font(BODY_FONT),
                        RecordState::Error(message) => {
                            text(format!("failed: {}", message)).size(12).font(BODY_FONT)
                        }
                    };

                    let save_button = if record.response().is_some() {
                        button("Save")
                            .on_press(Message::DownloadRecord(record.id))
                            .padding([4, 10])
                    } else {
                        button("Save").padding([4, 10])
                    };

                    let remove_button = if record.is_compressing() {
                        button("Remove").padding([4, 10])
                    } else {
                        button("Remove")
                            .on_press(Message::RemoveRecord(record.id))
                            .padding([4, 10])
                    };

                    row![
                        thumbnail,
                        column![
                            text(&record.filename).size(13).font(BODY_FONT),
                            detail,
                        ]
                        .spacing(2)
                        .width(Length::Fill),
                        save_button,
                        remove_button,
                    ]
                    .spacing(8)
                    .align_items(Alignment::Center)
                    .into()
                })
                .collect();

            column![container(
                scrollable(column(rows).spacing(6)).height(Length::Fixed(240.0))
            )
            .style(iced::theme::Container::Box)
            .padding(8),]
        };

        let status = if self.last_saved.is_some() {
            row![
                text(&self.status_message).size(12).font(BODY_FONT),
                button("Open Location")
                    .on_press(Message::OpenSaveLocation)
                    .padding([4, 10]),
            ]
            .spacing(8)
            .align_items(Alignment::Center)
        } else {
            row![text(&self.status_message).size(12).font(BODY_FONT)]
        };

        let content = column![
            title,
            Space::with_height(12),
            file_selection,
            Space::with_height(12),
            settings,
            Space::with_height(12),
            actions,
            Space::with_height(8),
            totals,
            Space::with_height(8),
            record_list,
            Space::with_height(8),
            status,
        ]
        .padding(16);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Light
    }
}

impl BatchCompressor {
    fn batch_running(&self) -> bool {
        self.in_flight > 0 || !self.queue.is_empty()
    }

    /// Feed the next queued records to the compression boundary, staying
    /// under the in-flight limit. With the default single worker this drives
    /// the batch strictly one image at a time, in session order.
    fn dispatch_next(&mut self) -> Command<Message> {
        let mut commands = Vec::new();
        while self.in_flight < self.workers {
            let id = match self.queue.pop_front() {
                Some(id) => id,
                None => break,
            };
            let request = match self.store.get(id) {
                Some(record) => CompressRequest {
                    filename: record.filename.clone(),
                    bytes: record.raw.clone(),
                    quality: Some(self.preset.quality_value(self.quality)),
                    format: self.format,
                },
                None => continue,
            };
            self.in_flight += 1;
            commands.push(Command::perform(
                async move {
                    compression::compress(request)
                        .await
                        .map_err(|error| error.to_string())
                },
                move |outcome| Message::ItemFinished(id, outcome),
            ));
        }
        Command::batch(commands)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Original => write!(f, "Keep original format"),
            Self::Jpeg => write!(f, "JPEG"),
            Self::Png => write!(f, "PNG"),
            Self::WebP => write!(f, "WebP"),
            Self::Avif => write!(f, "AVIF"),
        }
    }
}

// Helper functions
fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn is_image_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "webp" | "gif" | "avif")
        }
        None => false,
    }
}

fn collect_images(path: &Path) -> Vec<PathBuf> {
    let mut images = Vec::new();
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() && is_image_file(path) {
            images.push(path.to_path_buf());
        }
    }
    images
}

async fn pick_files() -> Vec<LoadedFile> {
    let picked = rfd::AsyncFileDialog::new()
        .add_filter("Images", &["jpg", "jpeg", "png", "webp", "gif", "avif"])
        .pick_files()
        .await;
    let paths: Vec<PathBuf> = picked
        .unwrap_or_default()
        .into_iter()
        .map(|handle| handle.path().to_path_buf())
        .collect();
    load_files(paths).await
}

async fn pick_folder() -> Vec<LoadedFile> {
    let paths = match rfd::AsyncFileDialog::new().pick_folder().await {
        Some(handle) => collect_images(handle.path()),
        None => Vec::new(),
    };
    load_files(paths).await
}

async fn load_files(paths: Vec<PathBuf>) -> Vec<LoadedFile> {
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for path in paths {
            match std::fs::read(&path) {
                Ok(bytes) => files.push(LoadedFile { path, bytes }),
                Err(error) => eprintln!("skipping {}: {}", path.display(), error),
            }
        }
        files
    })
    .await
    .unwrap_or_default()
}

async fn save_single(filename: String, payload: String) -> Result<Option<PathBuf>, String> {
    let bytes = archive::decode_payload(&payload)
        .ok_or_else(|| format!("malformed payload for {}", filename))?;
    save_bytes(filename, bytes).await
}

async fn save_archive(entries: Vec<(String, String)>) -> Result<Option<PathBuf>, String> {
    let bytes = archive::build(&entries).map_err(|error| error.to_string())?;
    save_bytes(archive::archive_filename(chrono::Local::now()), bytes).await
}

async fn save_bytes(filename: String, bytes: Vec<u8>) -> Result<Option<PathBuf>, String> {
    let target = rfd::AsyncFileDialog::new()
        .set_file_name(&filename)
        .save_file()
        .await;
    match target {
        Some(handle) => {
            let path = handle.path().to_path_buf();
            tokio::task::spawn_blocking(move || match std::fs::write(&path, &bytes) {
                Ok(()) => Ok(Some(path)),
                Err(error) => Err(error.to_string()),
            })
            .await
            .unwrap_or_else(|_| Err(String::from("save worker stopped unexpectedly")))
        }
        None => Ok(None),
    }
}
