//! Emitter selection: which objects of the host draw set write into the velocity buffer.
//!
//! Two policies run in a fixed order. `ByLayer` picks objects by object layer and keeps their
//! materials; `ByRenderingLayer` picks by rendering layer and draws everything with the shared
//! emitter material. The policies are independent, so an object matching both masks is drawn
//! twice.

use std::cmp::Ordering;
use std::ops::RangeInclusive;

use crate::command::CommandBuffer;
use crate::renderable::{MaterialHandle, Renderable, TRANSPARENT_QUEUE};
use crate::settings::VelocityPassSettings;

/// Shader passes a material must provide to be drawn.
pub const SHADER_TAGS: [&str; 5] = [
    "SRPDefaultUnlit",
    "UniversalForward",
    "Universal2D",
    "UniversalForwardOnly",
    "LightweightForward",
];

pub const MATCH_ALL: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteringSettings {
    pub layer_mask: u32,
    pub rendering_layer_mask: u32,
    pub render_queue: RangeInclusive<u32>,
}

impl FilteringSettings {
    /// Every transparent object.
    pub fn transparent() -> Self {
        Self {
            layer_mask: MATCH_ALL,
            rendering_layer_mask: MATCH_ALL,
            render_queue: TRANSPARENT_QUEUE,
        }
    }

    pub fn matches(&self, renderable: &Renderable) -> bool {
        renderable.layer_bit() & self.layer_mask != 0
            && renderable.rendering_layer_mask & self.rendering_layer_mask != 0
            && self.render_queue.contains(&renderable.render_queue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialSelection {
    Own,
    Override(MaterialHandle),
}

impl MaterialSelection {
    pub fn resolve(self, own: MaterialHandle) -> MaterialHandle {
        match self {
            MaterialSelection::Own => own,
            MaterialSelection::Override(material) => material,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterSelection {
    ByLayer,
    ByRenderingLayer,
}

impl EmitterSelection {
    /// Order the policies are drawn in.
    pub const ORDER: [EmitterSelection; 2] =
        [EmitterSelection::ByLayer, EmitterSelection::ByRenderingLayer];

    /// Filter for this policy, or `None` when its mask is empty.
    pub fn filtering(self, settings: &VelocityPassSettings) -> Option<FilteringSettings> {
        let base = FilteringSettings::transparent();
        match self {
            EmitterSelection::ByLayer if settings.layer_mask != 0 => Some(FilteringSettings {
                layer_mask: settings.layer_mask,
                ..base
            }),
            EmitterSelection::ByRenderingLayer if settings.rendering_layer_mask != 0 => {
                Some(FilteringSettings {
                    rendering_layer_mask: settings.rendering_layer_mask,
                    ..base
                })
            }
            _ => None,
        }
    }

    pub fn material(self, emitter_material: MaterialHandle) -> MaterialSelection {
        match self {
            EmitterSelection::ByLayer => MaterialSelection::Own,
            EmitterSelection::ByRenderingLayer => MaterialSelection::Override(emitter_material),
        }
    }
}

/// Shader pass tags accepted for drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawingSettings {
    shader_tags: Vec<String>,
}

impl Default for DrawingSettings {
    fn default() -> Self {
        Self::new(SHADER_TAGS)
    }
}

impl DrawingSettings {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shader_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn shader_tags(&self) -> &[String] {
        &self.shader_tags
    }

    pub fn accepts(&self, renderable: &Renderable) -> bool {
        self.shader_tags.iter().any(|tag| *tag == renderable.shader_tag)
    }
}

/// Transparent ordering: sorting order, then render queue, then back to front.
fn common_transparent(a: &Renderable, b: &Renderable) -> Ordering {
    a.sorting_order
        .cmp(&b.sorting_order)
        .then(a.render_queue.cmp(&b.render_queue))
        .then_with(|| b.depth.total_cmp(&a.depth))
}

/// Indices of the renderables passing `filter` and `drawing`, in draw order.
pub fn select(
    renderables: &[Renderable],
    filter: &FilteringSettings,
    drawing: &DrawingSettings,
) -> Vec<usize> {
    let mut indices: Vec<usize> = renderables
        .iter()
        .enumerate()
        .filter(|(_, r)| filter.matches(r) && drawing.accepts(r))
        .map(|(i, _)| i)
        .collect();
    indices.sort_by(|&a, &b| common_transparent(&renderables[a], &renderables[b]));
    indices
}

/// Record both emitter policies into `cmd`. Returns the number of draws recorded.
pub fn record_emitters(
    cmd: &mut CommandBuffer,
    renderables: &[Renderable],
    settings: &VelocityPassSettings,
    drawing: &DrawingSettings,
    emitter_material: MaterialHandle,
) -> usize {
    let mut draws = 0;
    for selection in EmitterSelection::ORDER {
        let Some(filter) = selection.filtering(settings) else {
            continue;
        };
        let material = selection.material(emitter_material);
        for index in select(renderables, &filter, drawing) {
            cmd.draw_renderer(index, material.resolve(renderables[index].material));
            draws += 1;
        }
    }
    draws
}
