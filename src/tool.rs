use std::cmp::Ordering;

use bevy::math::Vec4;

use crate::applicant::{BrushApplicant, EditContext};
use crate::error::{BrushEditorError, BrushResult};
use crate::gpu::TextureHandle;
use crate::height_tool::{HeightBrushKind, HeightEditTool};
use crate::input::BrushInputController;
use crate::object_placement::ObjectPlacementTool;
use crate::settings::ToolSettings;

/// A landscape editing tool.
///
/// Tools live as long as the editor. Heavy GPU resources only exist between
/// [`LandscapeTool::activate`] and [`LandscapeTool::deactivate`].
pub trait LandscapeTool: Send + Sync {
    /// Stable identifier, also the name of the tool's settings section.
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn sort_key(&self) -> i32;

    /// Allocates working textures and installs overrides. Loads settings.
    fn activate(&mut self, ctx: &EditContext, settings: &ToolSettings) -> BrushResult<()>;

    /// Releases whatever `activate` allocated. Saves settings.
    fn deactivate(&mut self, ctx: &EditContext, settings: &mut ToolSettings);

    /// Time based logic, once per frame while active.
    fn process(&mut self, delta_seconds: f32);

    fn input_controller(&self) -> &dyn BrushInputController;

    fn input_controller_mut(&mut self) -> &mut dyn BrushInputController;

    /// Present only while the tool is active.
    fn applicant(&mut self) -> Option<&mut dyn BrushApplicant>;

    fn cursor_texture(&self) -> Option<TextureHandle>;

    fn cover_texture(&self) -> Option<TextureHandle> {
        None
    }

    /// None draws the cursor in the configured default color.
    fn cursor_color(&self) -> Option<Vec4> {
        None
    }

    /// Normalized to the landscape size.
    fn brush_size(&self) -> f32;

    fn set_brush_size(&mut self, size: f32);

    /// Fraction of a full turn.
    fn brush_rotation(&self) -> f32;

    fn set_brush_rotation(&mut self, rotation: f32);
}

pub type ToolFactory = fn() -> Box<dyn LandscapeTool>;

#[derive(Clone, Copy)]
pub struct ToolRegistration {
    pub id: &'static str,
    pub factory: ToolFactory,
    pub sort_key: i32,
}

macro_rules! height_tool {
    ($kind:expr) => {
        ToolRegistration {
            id: $kind.id(),
            factory: || -> Box<dyn LandscapeTool> { Box::new(HeightEditTool::new($kind)) },
            sort_key: $kind.sort_key(),
        }
    };
}

/// Every tool shipped with the editor.
pub fn builtin_tools() -> Vec<ToolRegistration> {
    vec![
        height_tool!(HeightBrushKind::AddSub),
        height_tool!(HeightBrushKind::Flatten),
        height_tool!(HeightBrushKind::Smooth),
        height_tool!(HeightBrushKind::Sharpen),
        height_tool!(HeightBrushKind::Noise),
        height_tool!(HeightBrushKind::Average),
        height_tool!(HeightBrushKind::CloneStamp),
        height_tool!(HeightBrushKind::PushPull),
        height_tool!(HeightBrushKind::RaiseLower),
        height_tool!(HeightBrushKind::Set),
        ToolRegistration {
            id: ObjectPlacementTool::ID,
            factory: || -> Box<dyn LandscapeTool> { Box::new(ObjectPlacementTool::default()) },
            sort_key: ObjectPlacementTool::SORT_KEY,
        },
    ]
}

pub fn find_tool(registrations: &[ToolRegistration], id: &str) -> BrushResult<ToolRegistration> {
    registrations
        .iter()
        .find(|registration| registration.id == id)
        .copied()
        .ok_or_else(|| BrushEditorError::UnknownTool(id.to_string()))
}

/// One instance per registration, highest sort key first, ties by name.
pub fn instantiate_tools(registrations: &[ToolRegistration]) -> Vec<Box<dyn LandscapeTool>> {
    let mut tools: Vec<Box<dyn LandscapeTool>> = registrations
        .iter()
        .map(|registration| (registration.factory)())
        .collect();
    tools.sort_by(|a, b| compare_tools(a.as_ref(), b.as_ref()));
    tools
}

fn compare_tools(a: &dyn LandscapeTool, b: &dyn LandscapeTool) -> Ordering {
    b.sort_key()
        .cmp(&a.sort_key())
        .then_with(|| a.display_name().cmp(b.display_name()))
}
