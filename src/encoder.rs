//! Conversion of [`LogEvent`]s into [`GelfMessage`]s.
//!
//! The encoder attaches at most one category of extra fields per message.
//! Categories are evaluated in a fixed priority order (location, logger,
//! thread, marker, context map) and the first enabled one wins, even when
//! several are switched on.

use std::collections::BTreeMap;

use crate::{
    event::LogEvent,
    layout::SharedLayout,
    level::Severity,
    message::{FieldValue, GelfMessage, GelfMessageBuilder},
};

/// Converts a log event into a GELF message.
///
/// Encoding must not fail: absent optional data is simply omitted.
pub trait MessageEncoder: Send + Sync {
    fn encode(&self, event: &LogEvent) -> GelfMessage;
}

/// Extra-field categories in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtraField {
    Location,
    Logger,
    Thread,
    Marker,
    Context,
}

/// Flags enabling each extra-field category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtraFieldFlags {
    pub location: bool,
    pub logger: bool,
    pub thread: bool,
    pub marker: bool,
    pub context: bool,
}

type Extractor = fn(&LogEvent, &mut GelfMessageBuilder);

fn extract_location(event: &LogEvent, builder: &mut GelfMessageBuilder) {
    if let Some(caller) = &event.caller {
        builder.insert_field("_file", caller.file.as_str());
        builder.insert_field("_line", caller.line);
    }
}

fn extract_logger(event: &LogEvent, builder: &mut GelfMessageBuilder) {
    builder.insert_field("_logger", event.logger_name.as_str());
}

fn extract_thread(event: &LogEvent, builder: &mut GelfMessageBuilder) {
    if let Some(name) = &event.thread_name {
        builder.insert_field("_thread", name.as_str());
    }
}

fn extract_marker(event: &LogEvent, builder: &mut GelfMessageBuilder) {
    builder.insert_field("_marker", event.marker.as_deref().unwrap_or_default());
}

fn extract_context(event: &LogEvent, builder: &mut GelfMessageBuilder) {
    for (key, value) in &event.context {
        builder.insert_field(key, value.as_str());
    }
}

/// Ordered `(enabled, extractor)` pairs; the first enabled entry is applied.
#[derive(Clone, Debug)]
pub struct ExtraFieldSelector {
    candidates: [(ExtraField, bool, Extractor); 5],
}

impl ExtraFieldSelector {
    pub fn new(flags: ExtraFieldFlags) -> Self {
        Self {
            candidates: [
                (ExtraField::Location, flags.location, extract_location),
                (ExtraField::Logger, flags.logger, extract_logger),
                (ExtraField::Thread, flags.thread, extract_thread),
                (ExtraField::Marker, flags.marker, extract_marker),
                (ExtraField::Context, flags.context, extract_context),
            ],
        }
    }

    /// Category that will be attached, if any.
    pub fn selected(&self) -> Option<ExtraField> {
        self.candidates
            .iter()
            .find(|(_, enabled, _)| *enabled)
            .map(|(field, _, _)| *field)
    }

    pub fn apply(&self, event: &LogEvent, builder: &mut GelfMessageBuilder) {
        if let Some((_, _, extractor)) = self.candidates.iter().find(|(_, enabled, _)| *enabled) {
            extractor(event, builder);
        }
    }
}

/// Static settings consumed by [`DefaultEncoder`].
#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub origin_host: String,
    pub facility: String,
    pub additional_fields: BTreeMap<String, FieldValue>,
    pub extra_fields: ExtraFieldFlags,
}

/// Encoder used by the appender unless a custom one is supplied.
#[derive(Clone, Debug)]
pub struct DefaultEncoder {
    origin_host: String,
    facility: String,
    additional_fields: BTreeMap<String, FieldValue>,
    selector: ExtraFieldSelector,
    layout: SharedLayout,
}

impl DefaultEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self::with_layout(settings, SharedLayout::default())
    }

    pub fn with_layout(settings: EncoderSettings, layout: SharedLayout) -> Self {
        Self {
            origin_host: settings.origin_host,
            facility: settings.facility,
            additional_fields: settings.additional_fields,
            selector: ExtraFieldSelector::new(settings.extra_fields),
            layout,
        }
    }
}

impl MessageEncoder for DefaultEncoder {
    fn encode(&self, event: &LogEvent) -> GelfMessage {
        let severity = event.level.severity().unwrap_or(Severity::Debug);
        let mut builder = GelfMessage::builder(self.layout.short_message(event), &*self.origin_host)
            .timestamp(event.timestamp)
            .severity(severity)
            .fields(&self.additional_fields)
            .full_message(self.layout.full_message(event));
        builder.insert_field("_facility", self.facility.as_str());
        self.selector.apply(event, &mut builder);
        builder.build()
    }
}
