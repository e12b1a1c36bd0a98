//! Headless software implementation of [`MediaEngine`].
//!
//! Objects are reference counted like the native engine: a source lives while
//! any creator reference, scene item, transition slot or output channel holds
//! it, and its name is freed with it. Rendering paints flat BGRA colors
//! derived from source names into textures with padded rows, so consumers see
//! a real row stride. Render callbacks and meter listeners only run when the
//! owner calls [`SimulatedEngine::render_tick`] / [`SimulatedEngine::audio_tick`]
//! (directly, or through a [`SimClock`]).

mod clock;
mod kinds;

pub use clock::SimClock;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use url::Url;

use titan_ipc::{merge_settings, PropertyInfo, SettingValue, Settings, Transform};

use crate::error::EngineError;
use crate::{
    EncoderId, EngineResult, ItemId, ItemInfo, MappedTexture, MediaEngine, MeterId, MeterLevels,
    MeterScale, OutputId, RenderCallback, RenderCallbackId, RenderTargetId, SourceId, SourceInfo,
    TextureId, TransitionMode, VolmeterListener, BYTES_PER_PIXEL, GROUP_KIND, MAIN_CHANNEL,
    SCENE_KIND,
};

use kinds::{
    source_kind, AUDIO_ENCODER_KINDS, RECORD_OUTPUT_KIND, STREAM_OUTPUT_KIND, TRANSITION_KINDS,
    VIDEO_ENCODER_KINDS,
};

/// Byte written into row padding, so stride-unaware readers show up in tests.
pub const ROW_PADDING_BYTE: u8 = 0xAB;

/// Simulated engine configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Base canvas width in pixels.
    pub width: u32,

    /// Base canvas height in pixels.
    pub height: u32,

    /// Render ticks per second when driven by a [`SimClock`].
    pub fps: u32,

    /// Texture rows are padded to a multiple of this many bytes.
    pub row_alignment: usize,

    /// Linear peak reported for audio sources without an explicit level.
    pub default_signal: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            row_alignment: 64,
            default_signal: 0.5,
        }
    }
}

/// Live object counts, used to detect reference leaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub sources: usize,
    pub items: usize,
    pub meters: usize,
    pub render_callbacks: usize,
    pub render_targets: usize,
    pub encoders: usize,
    pub outputs: usize,
}

impl ObjectCounts {
    /// Returns true if no objects are alive.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Flat BGRA color derived from a source name (FNV-1a).
pub fn color_for(name: &str) -> [u8; 4] {
    let hash = name.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    });
    let [b, g, r, ..] = hash.to_le_bytes();
    [b, g, r, 0xFF]
}

/// Color of an empty canvas.
pub const BLACK: [u8; 4] = [0, 0, 0, 0xFF];

struct TransitionState {
    slot_a: Option<SourceId>,
    pending: Option<SourceId>,
    last_duration_ms: u32,
}

struct SimSource {
    name: String,
    kind: String,
    has_video: bool,
    has_audio: bool,
    public: bool,
    refs: usize,
    settings: Settings,
    muted: bool,
    signal: Option<f32>,
    items: Vec<ItemId>,
    transition: Option<TransitionState>,
}

impl SimSource {
    fn new(name: &str, kind: &str, has_video: bool, has_audio: bool, public: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            has_video,
            has_audio,
            public,
            refs: 1,
            settings: Settings::new(),
            muted: false,
            signal: None,
            items: Vec::new(),
            transition: None,
        }
    }

    fn is_container(&self) -> bool {
        self.kind == SCENE_KIND || self.kind == GROUP_KIND
    }
}

struct SimItem {
    container: SourceId,
    source: SourceId,
    transform: Transform,
}

struct SimMeter {
    source: Option<SourceId>,
    listeners: Vec<VolmeterListener>,
    #[allow(dead_code)]
    scale: MeterScale,
}

struct SimTexture {
    width: u32,
    height: u32,
    row_stride: usize,
    pixels: Bytes,
    mapped: bool,
}

struct SimEncoder {
    #[allow(dead_code)]
    kind: String,
}

struct SimOutput {
    kind: String,
    settings: Settings,
    video: Option<EncoderId>,
    audio: Option<EncoderId>,
    active: bool,
    last_error: Option<String>,
}

#[derive(Default)]
struct SimState {
    started: bool,
    fail_startup: bool,
    locale: Option<String>,
    next_id: u64,
    sources: HashMap<SourceId, SimSource>,
    names: HashMap<String, SourceId>,
    items: HashMap<ItemId, SimItem>,
    channels: HashMap<u32, SourceId>,
    meters: HashMap<MeterId, SimMeter>,
    callbacks: Vec<(RenderCallbackId, RenderCallback)>,
    textures: HashMap<TextureId, SimTexture>,
    main_texture: Option<TextureId>,
    targets: HashMap<RenderTargetId, Option<TextureId>>,
    active_target: Option<RenderTargetId>,
    encoders: HashMap<EncoderId, SimEncoder>,
    outputs: HashMap<OutputId, SimOutput>,
    frames_rendered: u64,
    leaked_at_shutdown: ObjectCounts,
}

impl SimState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_ref(&mut self, id: SourceId) -> bool {
        match self.sources.get_mut(&id) {
            Some(source) => {
                source.refs += 1;
                true
            }
            None => false,
        }
    }

    fn insert_source(&mut self, source: SimSource) -> Option<SourceId> {
        if source.public && self.names.contains_key(&source.name) {
            return None;
        }
        let id = SourceId(self.next_id());
        if source.public {
            self.names.insert(source.name.clone(), id);
        }
        self.sources.insert(id, source);
        Some(id)
    }

    fn release_source(&mut self, id: SourceId) {
        let Some(source) = self.sources.get_mut(&id) else {
            warn!(%id, "Release of unknown source");
            return;
        };
        source.refs = source.refs.saturating_sub(1);
        if source.refs > 0 {
            return;
        }

        let Some(source) = self.sources.remove(&id) else {
            return;
        };
        trace!(name = %source.name, "Destroying source");

        if source.public && self.names.get(&source.name) == Some(&id) {
            self.names.remove(&source.name);
        }
        for meter in self.meters.values_mut() {
            if meter.source == Some(id) {
                meter.source = None;
            }
        }
        for item_id in source.items {
            if let Some(item) = self.items.remove(&item_id) {
                self.release_source(item.source);
            }
        }
        if let Some(transition) = source.transition {
            for held in [transition.slot_a, transition.pending].into_iter().flatten() {
                self.release_source(held);
            }
        }
    }

    fn transition_mut(&mut self, id: SourceId) -> Option<&mut TransitionState> {
        self.sources.get_mut(&id)?.transition.as_mut()
    }

    fn info(&self, id: SourceId) -> Option<SourceInfo> {
        self.sources.get(&id).map(|source| SourceInfo {
            id,
            name: source.name.clone(),
            kind: source.kind.clone(),
            has_video: source.has_video,
            has_audio: source.has_audio,
        })
    }

    /// Color the given source renders as, following transitions to slot A.
    fn color_of(&self, id: SourceId) -> [u8; 4] {
        match self.sources.get(&id) {
            Some(source) => match &source.transition {
                Some(transition) => transition
                    .slot_a
                    .map_or(BLACK, |program| self.color_of(program)),
                None => color_for(&source.name),
            },
            None => BLACK,
        }
    }

    fn counts(&self) -> ObjectCounts {
        ObjectCounts {
            sources: self.sources.len(),
            items: self.items.len(),
            meters: self.meters.len(),
            render_callbacks: self.callbacks.len(),
            render_targets: self.targets.len(),
            encoders: self.encoders.len(),
            outputs: self.outputs.len(),
        }
    }

    fn paint(&mut self, texture: TextureId, width: u32, height: u32, color: [u8; 4], alignment: usize) {
        let Some(tex) = self.textures.get_mut(&texture) else {
            return;
        };
        if tex.mapped {
            trace!(%texture, "Texture mapped, skipping paint");
            return;
        }
        let row_stride = aligned_stride(width, alignment);
        tex.width = width;
        tex.height = height;
        tex.row_stride = row_stride;
        tex.pixels = paint_canvas(width, height, row_stride, color);
    }
}

fn aligned_stride(width: u32, alignment: usize) -> usize {
    let row = width as usize * BYTES_PER_PIXEL;
    let alignment = alignment.max(1);
    row.div_ceil(alignment) * alignment
}

fn paint_canvas(width: u32, height: u32, row_stride: usize, color: [u8; 4]) -> Bytes {
    let row_bytes = width as usize * BYTES_PER_PIXEL;
    let mut pixels = vec![ROW_PADDING_BYTE; row_stride * height as usize];
    for row in pixels.chunks_exact_mut(row_stride.max(1)) {
        for pixel in row[..row_bytes].chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&color);
        }
    }
    Bytes::from(pixels)
}

fn setting_str<'a>(settings: &'a Settings, key: &str) -> &'a str {
    settings
        .get(key)
        .and_then(SettingValue::as_str)
        .unwrap_or_default()
}

/// Headless software media engine.
pub struct SimulatedEngine {
    config: SimConfig,
    state: Mutex<SimState>,
}

impl SimulatedEngine {
    /// Create a stopped engine.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Make the next `startup` calls fail.
    pub fn set_fail_startup(&self, fail: bool) {
        self.state.lock().fail_startup = fail;
    }

    /// Returns true between `startup` and `shutdown`.
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Locale passed to the last successful `startup`.
    pub fn locale(&self) -> Option<String> {
        self.state.lock().locale.clone()
    }

    /// Set the linear peak an audio source reports on each audio tick.
    pub fn set_signal_level(&self, name: &str, level: f32) -> EngineResult<()> {
        let mut state = self.state.lock();
        let id = *state
            .names
            .get(name)
            .ok_or_else(|| EngineError::SourceNotFound(name.to_string()))?;
        if let Some(source) = state.sources.get_mut(&id) {
            source.signal = Some(level.max(0.0));
        }
        Ok(())
    }

    /// Add an empty group named `group` to the scene or group `container`.
    pub fn add_group(&self, container: &str, group: &str) -> EngineResult<ItemId> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(EngineError::NotStarted);
        }
        let container_id = *state
            .names
            .get(container)
            .ok_or_else(|| EngineError::SourceNotFound(container.to_string()))?;
        if !state
            .sources
            .get(&container_id)
            .is_some_and(SimSource::is_container)
        {
            return Err(EngineError::NotAContainer(container.to_string()));
        }

        let group_id = state
            .insert_source(SimSource::new(group, GROUP_KIND, true, false, true))
            .ok_or_else(|| EngineError::NameInUse(group.to_string()))?;
        let item_id = ItemId(state.next_id());
        state.items.insert(
            item_id,
            SimItem {
                container: container_id,
                source: group_id,
                transform: Transform::IDENTITY,
            },
        );
        if let Some(source) = state.sources.get_mut(&container_id) {
            source.items.push(item_id);
        }
        debug!(container, group, "Group added");
        Ok(item_id)
    }

    /// Number of render ticks performed since creation.
    pub fn frames_rendered(&self) -> u64 {
        self.state.lock().frames_rendered
    }

    /// Objects currently alive.
    pub fn live_objects(&self) -> ObjectCounts {
        self.state.lock().counts()
    }

    /// Objects that were still alive at the last `shutdown`.
    pub fn leaked_at_shutdown(&self) -> ObjectCounts {
        self.state.lock().leaked_at_shutdown
    }

    /// Duration passed to the last `transition_start` of `transition`.
    pub fn last_transition_duration(&self, transition: SourceId) -> Option<u32> {
        self.state
            .lock()
            .sources
            .get(&transition)
            .and_then(|source| source.transition.as_ref())
            .map(|t| t.last_duration_ms)
    }

    /// Composite one frame and invoke every render callback.
    pub fn render_tick(&self) {
        let (callbacks, width, height) = {
            let mut state = self.state.lock();
            if !state.started {
                return;
            }
            let color = state
                .channels
                .get(&MAIN_CHANNEL)
                .map_or(BLACK, |source| state.color_of(*source));
            if let Some(main) = state.main_texture {
                state.paint(
                    main,
                    self.config.width,
                    self.config.height,
                    color,
                    self.config.row_alignment,
                );
            }
            state.frames_rendered += 1;
            let callbacks: Vec<RenderCallback> =
                state.callbacks.iter().map(|(_, cb)| Arc::clone(cb)).collect();
            (callbacks, self.config.width, self.config.height)
        };

        for callback in callbacks {
            callback(width, height);
        }
    }

    /// Deliver one audio block to every attached meter.
    pub fn audio_tick(&self) {
        let deliveries: Vec<(f32, Vec<VolmeterListener>)> = {
            let state = self.state.lock();
            if !state.started {
                return;
            }
            state
                .meters
                .values()
                .filter_map(|meter| {
                    let source = state.sources.get(&meter.source?)?;
                    let peak = if source.muted {
                        0.0
                    } else {
                        source.signal.unwrap_or(self.config.default_signal)
                    };
                    Some((peak, meter.listeners.clone()))
                })
                .collect()
        };

        for (peak, listeners) in deliveries {
            let peaks = [peak, peak];
            let magnitude = [peak * std::f32::consts::FRAC_1_SQRT_2; 2];
            let levels = MeterLevels {
                magnitude: &magnitude,
                peak: &peaks,
            };
            for listener in listeners {
                listener(&levels);
            }
        }
    }

    /// Drive render and audio ticks from background threads.
    pub fn start_clock(self: &Arc<Self>) -> SimClock {
        SimClock::start(Arc::clone(self))
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl MediaEngine for SimulatedEngine {
    fn startup(&self, locale: &str) -> bool {
        let mut state = self.state.lock();
        if state.fail_startup {
            warn!("Simulated startup failure");
            return false;
        }
        if state.started {
            return true;
        }
        let id = TextureId(state.next_id());
        state.textures.insert(
            id,
            SimTexture {
                width: 0,
                height: 0,
                row_stride: 0,
                pixels: Bytes::new(),
                mapped: false,
            },
        );
        state.main_texture = Some(id);
        state.started = true;
        state.locale = Some(locale.to_string());
        info!(locale, "Simulated engine started");
        true
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.started {
            return;
        }
        let leaked = state.counts();
        if !leaked.is_empty() {
            warn!(?leaked, "Objects alive at shutdown");
        }
        let frames_rendered = state.frames_rendered;
        let fail_startup = state.fail_startup;
        *state = SimState {
            leaked_at_shutdown: leaked,
            frames_rendered,
            fail_startup,
            ..SimState::default()
        };
        info!("Simulated engine stopped");
    }

    fn create_source(&self, kind: &str, name: &str, settings: &Settings) -> Option<SourceId> {
        let mut state = self.state.lock();
        if !state.started {
            return None;
        }
        let Some(def) = source_kind(kind) else {
            debug!(kind, "Unknown source kind");
            return None;
        };
        let mut source = SimSource::new(name, def.id, def.has_video, def.has_audio, true);
        source.settings = settings.clone();
        state.insert_source(source)
    }

    fn create_scene(&self, name: &str) -> Option<SourceId> {
        let mut state = self.state.lock();
        if !state.started {
            return None;
        }
        state.insert_source(SimSource::new(name, SCENE_KIND, true, false, true))
    }

    fn create_transition(&self, kind: &str, name: &str) -> Option<SourceId> {
        let mut state = self.state.lock();
        if !state.started || !TRANSITION_KINDS.contains(&kind) {
            return None;
        }
        let mut source = SimSource::new(name, kind, true, false, false);
        source.transition = Some(TransitionState {
            slot_a: None,
            pending: None,
            last_duration_ms: 0,
        });
        state.insert_source(source)
    }

    fn release(&self, source: SourceId) {
        self.state.lock().release_source(source);
    }

    fn get_by_name(&self, name: &str) -> Option<SourceId> {
        let mut state = self.state.lock();
        let id = *state.names.get(name)?;
        state.add_ref(id).then_some(id)
    }

    fn enumerate_sources(&self, visitor: &mut dyn FnMut(&SourceInfo) -> bool) {
        let infos: Vec<SourceInfo> = {
            let state = self.state.lock();
            let mut ids: Vec<SourceId> = state
                .sources
                .iter()
                .filter(|(_, source)| source.public)
                .map(|(id, _)| *id)
                .collect();
            ids.sort();
            ids.into_iter().filter_map(|id| state.info(id)).collect()
        };
        for info in &infos {
            if !visitor(info) {
                break;
            }
        }
    }

    fn source_info(&self, source: SourceId) -> Option<SourceInfo> {
        self.state.lock().info(source)
    }

    fn source_settings(&self, source: SourceId) -> Settings {
        self.state
            .lock()
            .sources
            .get(&source)
            .map(|s| s.settings.clone())
            .unwrap_or_default()
    }

    fn source_update(&self, source: SourceId, settings: &Settings) {
        if let Some(s) = self.state.lock().sources.get_mut(&source) {
            merge_settings(&mut s.settings, settings);
        }
    }

    fn source_properties(&self, source: SourceId) -> Vec<PropertyInfo> {
        let state = self.state.lock();
        state
            .sources
            .get(&source)
            .and_then(|s| source_kind(&s.kind))
            .map(|def| (def.properties)())
            .unwrap_or_default()
    }

    fn source_set_muted(&self, source: SourceId, muted: bool) {
        if let Some(s) = self.state.lock().sources.get_mut(&source) {
            s.muted = muted;
        }
    }

    fn source_muted(&self, source: SourceId) -> bool {
        self.state
            .lock()
            .sources
            .get(&source)
            .is_some_and(|s| s.muted)
    }

    fn scene_add_item(&self, container: SourceId, source: SourceId) -> Option<ItemId> {
        let mut state = self.state.lock();
        if container == source
            || !state.sources.get(&container).is_some_and(SimSource::is_container)
            || !state.add_ref(source)
        {
            return None;
        }
        let id = ItemId(state.next_id());
        state.items.insert(
            id,
            SimItem {
                container,
                source,
                transform: Transform::IDENTITY,
            },
        );
        if let Some(c) = state.sources.get_mut(&container) {
            c.items.push(id);
        }
        Some(id)
    }

    fn scene_remove_item(&self, item: ItemId) {
        let mut state = self.state.lock();
        let Some(removed) = state.items.remove(&item) else {
            return;
        };
        if let Some(container) = state.sources.get_mut(&removed.container) {
            container.items.retain(|id| *id != item);
        }
        state.release_source(removed.source);
    }

    fn scene_items(&self, container: SourceId) -> Vec<ItemInfo> {
        let state = self.state.lock();
        let Some(c) = state.sources.get(&container) else {
            return Vec::new();
        };
        c.items
            .iter()
            .filter_map(|id| {
                let item = state.items.get(id)?;
                let source = state.sources.get(&item.source)?;
                Some(ItemInfo {
                    id: *id,
                    source: item.source,
                    name: source.name.clone(),
                    kind: source.kind.clone(),
                    has_audio: source.has_audio,
                })
            })
            .collect()
    }

    fn item_transform(&self, item: ItemId) -> Option<Transform> {
        self.state.lock().items.get(&item).map(|i| i.transform)
    }

    fn set_item_transform(&self, item: ItemId, transform: &Transform) {
        if let Some(i) = self.state.lock().items.get_mut(&item) {
            i.transform = *transform;
        }
    }

    fn transition_set(&self, transition: SourceId, source: Option<SourceId>) {
        let mut state = self.state.lock();
        if let Some(new) = source {
            if !state.add_ref(new) {
                return;
            }
        }
        let previous = match state.transition_mut(transition) {
            Some(t) => std::mem::replace(&mut t.slot_a, source),
            None => {
                // Not a transition: undo the reference taken above.
                if let Some(new) = source {
                    state.release_source(new);
                }
                return;
            }
        };
        if let Some(previous) = previous {
            state.release_source(previous);
        }
    }

    fn transition_set_target(&self, transition: SourceId, source: SourceId) {
        let mut state = self.state.lock();
        if !state.add_ref(source) {
            return;
        }
        let previous = match state.transition_mut(transition) {
            Some(t) => t.pending.replace(source),
            None => {
                state.release_source(source);
                return;
            }
        };
        if let Some(previous) = previous {
            state.release_source(previous);
        }
    }

    fn transition_clear_target(&self, transition: SourceId) {
        let mut state = self.state.lock();
        let pending = state.transition_mut(transition).and_then(|t| t.pending.take());
        if let Some(pending) = pending {
            state.release_source(pending);
        }
    }

    fn transition_start(&self, transition: SourceId, mode: TransitionMode, duration_ms: u32) -> bool {
        let mut state = self.state.lock();
        let Some(t) = state.transition_mut(transition) else {
            return false;
        };
        let Some(target) = t.pending.take() else {
            return false;
        };
        t.last_duration_ms = duration_ms;
        let previous = t.slot_a.replace(target);
        if let Some(previous) = previous {
            state.release_source(previous);
        }
        debug!(?mode, duration_ms, "Transition started");
        true
    }

    fn transition_get_slot_a(&self, transition: SourceId) -> Option<SourceId> {
        let mut state = self.state.lock();
        let slot_a = state.transition_mut(transition)?.slot_a?;
        state.add_ref(slot_a).then_some(slot_a)
    }

    fn set_output_source(&self, channel: u32, source: Option<SourceId>) {
        let mut state = self.state.lock();
        if let Some(new) = source {
            if !state.add_ref(new) {
                return;
            }
        }
        let previous = match source {
            Some(new) => state.channels.insert(channel, new),
            None => state.channels.remove(&channel),
        };
        if let Some(previous) = previous {
            state.release_source(previous);
        }
    }

    fn meter_create(&self, scale: MeterScale) -> MeterId {
        let mut state = self.state.lock();
        let id = MeterId(state.next_id());
        state.meters.insert(
            id,
            SimMeter {
                source: None,
                listeners: Vec::new(),
                scale,
            },
        );
        id
    }

    fn meter_attach(&self, meter: MeterId, source: SourceId) -> bool {
        let mut state = self.state.lock();
        if !state.sources.get(&source).is_some_and(|s| s.has_audio) {
            return false;
        }
        match state.meters.get_mut(&meter) {
            Some(m) => {
                m.source = Some(source);
                true
            }
            None => false,
        }
    }

    fn meter_add_listener(&self, meter: MeterId, listener: VolmeterListener) {
        if let Some(m) = self.state.lock().meters.get_mut(&meter) {
            m.listeners.push(listener);
        }
    }

    fn meter_destroy(&self, meter: MeterId) {
        let removed = self.state.lock().meters.remove(&meter);
        // Listeners (and whatever they own) drop here, outside the engine lock.
        drop(removed);
    }

    fn register_render_callback(&self, callback: RenderCallback) -> RenderCallbackId {
        let mut state = self.state.lock();
        let id = RenderCallbackId(state.next_id());
        state.callbacks.push((id, callback));
        id
    }

    fn unregister_render_callback(&self, id: RenderCallbackId) {
        let removed: Vec<_> = {
            let mut state = self.state.lock();
            let (removed, kept) = std::mem::take(&mut state.callbacks)
                .into_iter()
                .partition(|(cb_id, _)| *cb_id == id);
            state.callbacks = kept;
            removed
        };
        drop(removed);
    }

    fn main_texture(&self) -> Option<TextureId> {
        let state = self.state.lock();
        let id = state.main_texture?;
        state
            .textures
            .get(&id)
            .is_some_and(|t| !t.pixels.is_empty())
            .then_some(id)
    }

    fn texture_size(&self, texture: TextureId) -> (u32, u32) {
        self.state
            .lock()
            .textures
            .get(&texture)
            .map_or((0, 0), |t| (t.width, t.height))
    }

    fn render_target_create(&self) -> RenderTargetId {
        let mut state = self.state.lock();
        let id = RenderTargetId(state.next_id());
        state.targets.insert(id, None);
        id
    }

    fn render_target_destroy(&self, target: RenderTargetId) {
        let mut state = self.state.lock();
        if let Some(Some(texture)) = state.targets.remove(&target) {
            state.textures.remove(&texture);
        }
        if state.active_target == Some(target) {
            state.active_target = None;
        }
    }

    fn render_target_begin(&self, target: RenderTargetId, width: u32, height: u32) -> bool {
        let mut state = self.state.lock();
        if !state.started || width == 0 || height == 0 || state.active_target.is_some() {
            return false;
        }
        let texture = match state.targets.get(&target) {
            Some(Some(texture)) => *texture,
            Some(None) => {
                let texture = TextureId(state.next_id());
                state.textures.insert(
                    texture,
                    SimTexture {
                        width: 0,
                        height: 0,
                        row_stride: 0,
                        pixels: Bytes::new(),
                        mapped: false,
                    },
                );
                state.targets.insert(target, Some(texture));
                texture
            }
            None => return false,
        };
        state.paint(texture, width, height, BLACK, self.config.row_alignment);
        state.active_target = Some(target);
        true
    }

    fn render_source(&self, source: SourceId) {
        let mut state = self.state.lock();
        let Some(target) = state.active_target else {
            return;
        };
        let Some(Some(texture)) = state.targets.get(&target).copied() else {
            return;
        };
        let (width, height) = state
            .textures
            .get(&texture)
            .map_or((0, 0), |t| (t.width, t.height));
        let color = state.color_of(source);
        state.paint(texture, width, height, color, self.config.row_alignment);
    }

    fn render_target_end(&self, target: RenderTargetId) {
        let mut state = self.state.lock();
        if state.active_target == Some(target) {
            state.active_target = None;
        }
    }

    fn render_target_texture(&self, target: RenderTargetId) -> Option<TextureId> {
        self.state.lock().targets.get(&target).copied().flatten()
    }

    fn map_texture(&self, texture: TextureId) -> Option<MappedTexture> {
        let mut state = self.state.lock();
        let tex = state.textures.get_mut(&texture)?;
        if tex.mapped || tex.pixels.is_empty() {
            return None;
        }
        tex.mapped = true;
        Some(MappedTexture {
            pixels: tex.pixels.clone(),
            row_stride: tex.row_stride,
            width: tex.width,
            height: tex.height,
        })
    }

    fn unmap_texture(&self, texture: TextureId) {
        if let Some(tex) = self.state.lock().textures.get_mut(&texture) {
            tex.mapped = false;
        }
    }

    fn video_encoder_create(&self, kind: &str, _name: &str, _settings: &Settings) -> Option<EncoderId> {
        let mut state = self.state.lock();
        if !state.started || !VIDEO_ENCODER_KINDS.contains(&kind) {
            return None;
        }
        let id = EncoderId(state.next_id());
        state.encoders.insert(id, SimEncoder { kind: kind.to_string() });
        Some(id)
    }

    fn audio_encoder_create(&self, kind: &str, _name: &str, _settings: &Settings) -> Option<EncoderId> {
        let mut state = self.state.lock();
        if !state.started || !AUDIO_ENCODER_KINDS.contains(&kind) {
            return None;
        }
        let id = EncoderId(state.next_id());
        state.encoders.insert(id, SimEncoder { kind: kind.to_string() });
        Some(id)
    }

    fn encoder_release(&self, encoder: EncoderId) {
        self.state.lock().encoders.remove(&encoder);
    }

    fn output_create(&self, kind: &str, name: &str, settings: &Settings) -> Option<OutputId> {
        let mut state = self.state.lock();
        if !state.started || (kind != STREAM_OUTPUT_KIND && kind != RECORD_OUTPUT_KIND) {
            return None;
        }
        let id = OutputId(state.next_id());
        state.outputs.insert(
            id,
            SimOutput {
                kind: kind.to_string(),
                settings: settings.clone(),
                video: None,
                audio: None,
                active: false,
                last_error: None,
            },
        );
        debug!(kind, name, "Output created");
        Some(id)
    }

    fn output_set_video_encoder(&self, output: OutputId, encoder: EncoderId) {
        if let Some(o) = self.state.lock().outputs.get_mut(&output) {
            o.video = Some(encoder);
        }
    }

    fn output_set_audio_encoder(&self, output: OutputId, encoder: EncoderId) {
        if let Some(o) = self.state.lock().outputs.get_mut(&output) {
            o.audio = Some(encoder);
        }
    }

    fn output_start(&self, output: OutputId) -> bool {
        let mut state = self.state.lock();
        let encoders_alive = match state.outputs.get(&output) {
            Some(o) => [o.video, o.audio]
                .iter()
                .all(|e| e.is_some_and(|e| state.encoders.contains_key(&e))),
            None => return false,
        };
        let Some(o) = state.outputs.get_mut(&output) else {
            return false;
        };
        if o.active {
            return true;
        }

        let result = if !encoders_alive {
            Err("missing encoders".to_string())
        } else if o.kind == STREAM_OUTPUT_KIND {
            validate_stream_settings(&o.settings)
        } else if setting_str(&o.settings, "path").is_empty() {
            Err("no recording path".to_string())
        } else {
            Ok(())
        };

        match result {
            Ok(()) => {
                o.active = true;
                o.last_error = None;
                true
            }
            Err(message) => {
                debug!(%output, %message, "Output start rejected");
                o.last_error = Some(message);
                false
            }
        }
    }

    fn output_stop(&self, output: OutputId) {
        if let Some(o) = self.state.lock().outputs.get_mut(&output) {
            o.active = false;
        }
    }

    fn output_active(&self, output: OutputId) -> bool {
        self.state
            .lock()
            .outputs
            .get(&output)
            .is_some_and(|o| o.active)
    }

    fn output_last_error(&self, output: OutputId) -> Option<String> {
        self.state
            .lock()
            .outputs
            .get(&output)
            .and_then(|o| o.last_error.clone())
    }

    fn output_release(&self, output: OutputId) {
        self.state.lock().outputs.remove(&output);
    }
}

fn validate_stream_settings(settings: &Settings) -> Result<(), String> {
    let server = setting_str(settings, "server");
    let url = Url::parse(server).map_err(|e| format!("invalid server URL '{server}': {e}"))?;
    if url.scheme() != "rtmp" && url.scheme() != "rtmps" {
        return Err("server URL must start with rtmp:// or rtmps://".to_string());
    }
    if setting_str(settings, "key").is_empty() {
        return Err("empty stream key".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> SimulatedEngine {
        let engine = SimulatedEngine::new(SimConfig {
            width: 8,
            height: 4,
            ..Default::default()
        });
        assert!(engine.startup("en-US"));
        engine
    }

    #[test]
    fn test_aligned_stride_pads_rows() {
        assert_eq!(aligned_stride(8, 64), 64);
        assert_eq!(aligned_stride(16, 64), 64);
        assert_eq!(aligned_stride(17, 64), 128);
        assert_eq!(aligned_stride(3, 1), 12);
    }

    #[test]
    fn test_names_are_unique_and_freed_on_release() {
        let engine = started();
        let scene = engine.create_scene("Main").unwrap();
        assert!(engine.create_scene("Main").is_none());
        assert!(engine
            .create_source("capture_device", "Main", &Settings::new())
            .is_none());

        engine.release(scene);
        assert!(engine.get_by_name("Main").is_none());
        assert!(engine.create_scene("Main").is_some());
    }

    #[test]
    fn test_scene_item_keeps_source_alive() {
        let engine = started();
        let scene = engine.create_scene("Main").unwrap();
        let cam = engine
            .create_source("capture_device", "Cam", &Settings::new())
            .unwrap();
        let item = engine.scene_add_item(scene, cam).unwrap();
        engine.release(cam);
        assert!(engine.get_by_name("Cam").map(|id| engine.release(id)).is_some());

        engine.scene_remove_item(item);
        assert!(engine.get_by_name("Cam").is_none());

        engine.release(scene);
        assert_eq!(engine.live_objects().sources, 0);
        assert_eq!(engine.live_objects().items, 0);
    }

    #[test]
    fn test_find_item_recursive_descends_into_groups() {
        let engine = started();
        let scene = engine.create_scene("Main").unwrap();
        engine.add_group("Main", "Group").unwrap();
        let group = engine.get_by_name("Group").unwrap();
        let mic = engine
            .create_source("audio_input_capture", "Mic", &Settings::new())
            .unwrap();
        engine.scene_add_item(group, mic).unwrap();

        let found = engine.find_item_recursive(scene, "Mic").unwrap();
        assert_eq!(found.source, mic);
        assert!(found.has_audio);
        assert!(engine.find_item_recursive(scene, "Nope").is_none());

        engine.release(mic);
        engine.release(group);
        engine.release(scene);
        assert_eq!(engine.live_objects().sources, 0);
        assert_eq!(engine.live_objects().items, 0);
    }

    #[test]
    fn test_transition_target_applies_on_start() {
        let engine = started();
        let a = engine.create_scene("A").unwrap();
        let b = engine.create_scene("B").unwrap();
        let transition = engine.create_transition("cut_transition", "t").unwrap();

        engine.transition_set(transition, Some(a));
        engine.transition_set_target(transition, b);
        let slot = engine.transition_get_slot_a(transition).unwrap();
        assert_eq!(slot, a);
        engine.release(slot);

        assert!(engine.transition_start(transition, TransitionMode::Auto, 300));
        let slot = engine.transition_get_slot_a(transition).unwrap();
        assert_eq!(slot, b);
        engine.release(slot);
        assert!(!engine.transition_start(transition, TransitionMode::Auto, 300));

        engine.release(transition);
        engine.release(a);
        engine.release(b);
        assert_eq!(engine.live_objects().sources, 0);
    }

    #[test]
    fn test_cleared_target_releases_source() {
        let engine = started();
        let a = engine.create_scene("A").unwrap();
        let transition = engine.create_transition("cut_transition", "t").unwrap();

        engine.transition_set_target(transition, a);
        engine.release(a);
        assert!(engine.get_by_name("A").map(|a| engine.release(a)).is_some());

        engine.transition_clear_target(transition);
        assert!(engine.get_by_name("A").is_none());
        assert!(!engine.transition_start(transition, TransitionMode::Auto, 300));

        engine.release(transition);
        assert_eq!(engine.live_objects().sources, 0);
    }

    #[test]
    fn test_main_texture_has_padded_rows() {
        let engine = started();
        let scene = engine.create_scene("A").unwrap();
        engine.set_output_source(MAIN_CHANNEL, Some(scene));
        engine.render_tick();

        let texture = engine.main_texture().unwrap();
        let mapped = engine.map_texture(texture).unwrap();
        assert_eq!((mapped.width, mapped.height), (8, 4));
        assert_eq!(mapped.row_stride, 64);
        assert_eq!(&mapped.pixels[..4], &color_for("A"));
        assert_eq!(mapped.pixels[32], ROW_PADDING_BYTE);
        assert!(engine.map_texture(texture).is_none());
        engine.unmap_texture(texture);

        engine.set_output_source(MAIN_CHANNEL, None);
        engine.release(scene);
    }

    #[test]
    fn test_stream_output_validates_server() {
        let engine = started();
        let video = engine.video_encoder_create("obs_x264", "v", &Settings::new()).unwrap();
        let audio = engine.audio_encoder_create("ffmpeg_aac", "a", &Settings::new()).unwrap();

        let mut settings = Settings::new();
        settings.insert("server".into(), "http://example.com/live".into());
        settings.insert("key".into(), "abc".into());
        let output = engine.output_create("rtmp_output", "s", &settings).unwrap();
        engine.output_set_video_encoder(output, video);
        engine.output_set_audio_encoder(output, audio);
        assert!(!engine.output_start(output));
        assert!(engine.output_last_error(output).unwrap().contains("rtmp"));

        settings.insert("server".into(), "rtmp://live.example.com/app".into());
        let output2 = engine.output_create("rtmp_output", "s2", &settings).unwrap();
        assert!(!engine.output_start(output2));
        engine.output_set_video_encoder(output2, video);
        engine.output_set_audio_encoder(output2, audio);
        assert!(engine.output_start(output2));
        assert!(engine.output_active(output2));
    }

    #[test]
    fn test_audio_tick_reports_zero_when_muted() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let engine = started();
        let mic = engine
            .create_source("audio_input_capture", "Mic", &Settings::new())
            .unwrap();
        let meter = engine.meter_create(MeterScale::Cubic);
        assert!(engine.meter_attach(meter, mic));

        let last = Arc::new(AtomicU32::new(u32::MAX));
        let sink = Arc::clone(&last);
        engine.meter_add_listener(
            meter,
            Arc::new(move |levels: &MeterLevels<'_>| {
                sink.store(levels.peak[0].to_bits(), Ordering::SeqCst);
            }),
        );

        engine.audio_tick();
        assert_eq!(f32::from_bits(last.load(Ordering::SeqCst)), 0.5);

        engine.source_set_muted(mic, true);
        engine.audio_tick();
        assert_eq!(f32::from_bits(last.load(Ordering::SeqCst)), 0.0);

        engine.meter_destroy(meter);
        engine.release(mic);
    }
}
