//! Orientation layers a viewer can align to.
//!
//! An [`OrientationManager`] owns one reference image and the rotated,
//! coordinates-only frames built from it. Selecting a layer is what makes
//! viewers re-orient; subscribers learn about changes through
//! [`OrientationEvent`]s sent over channels they registered for.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use thiserror::Error;

use crate::compass::{CompassConfig, CompassGeometry, compute_compass_with};
use crate::rotated::{FrameConfig, RotatedFrame, synthesize_rotated_frame};
use crate::wcs::{ImageShape, WcsError, WcsInfo, WorldMapping};

pub const NORTH_UP_EAST_LEFT: &str = "North-up, East-left";
pub const NORTH_UP_EAST_RIGHT: &str = "North-up, East-right";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrientationError {
    #[error(transparent)]
    Wcs(#[from] WcsError),

    #[error("must be aligned by WCS to add orientation options")]
    NotLinkedByWcs,

    #[error("orientation {0:?} already exists")]
    DuplicateLabel(String),

    #[error("no orientation named {0:?}")]
    UnknownLabel(String),

    #[error("the reference image {0:?} cannot be removed")]
    ReferenceLayer(String),

    #[error("invalid rotation angle {0:?}")]
    InvalidAngle(String),
}

/// How viewers are linked to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Pixels,
    Wcs,
}

/// A loaded image: the reference orientation layers are built from.
#[derive(Clone)]
pub struct Dataset {
    pub label: String,
    pub shape: ImageShape,
    pub mapping: Option<Arc<dyn WorldMapping + Send + Sync>>,
    /// Header keywords, used for the pixel scale of non-linear mappings.
    pub wcs_info: Option<WcsInfo>,
}

impl Dataset {
    pub fn new(label: impl Into<String>, shape: ImageShape) -> Self {
        Self {
            label: label.into(),
            shape,
            mapping: None,
            wcs_info: None,
        }
    }

    pub fn with_mapping(mut self, mapping: impl WorldMapping + Send + Sync + 'static) -> Self {
        self.mapping = Some(Arc::new(mapping));
        self
    }

    pub fn with_wcs_info(mut self, info: WcsInfo) -> Self {
        self.wcs_info = Some(info);
        self
    }

    fn mapping(&self) -> Result<&dyn WorldMapping, WcsError> {
        match &self.mapping {
            Some(m) => Ok(m.as_ref()),
            None => Err(WcsError::NoWcs(self.label.clone())),
        }
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("label", &self.label)
            .field("shape", &self.shape)
            .field("has_wcs", &self.mapping.is_some())
            .field("wcs_info", &self.wcs_info)
            .finish()
    }
}

/// Parameters of a new orientation layer.
#[derive(Debug, Clone)]
pub struct OrientationRequest {
    /// Counter-clockwise rotation in degrees relative to the reference.
    pub rotation_angle: f64,
    pub east_left: bool,
    /// Defaults to [`default_label`].
    pub label: Option<String>,
    /// Select the layer once created.
    pub select: bool,
}

impl Default for OrientationRequest {
    fn default() -> Self {
        Self {
            rotation_angle: 0.0,
            east_left: true,
            label: None,
            select: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrientationLayer {
    pub label: String,
    pub rotation_angle: f64,
    pub east_left: bool,
    pub frame: RotatedFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrientationEvent {
    Added { label: String },
    Selected { label: String },
    Removed { label: String },
}

/// Label used when the caller does not name an orientation.
pub fn default_label(rotation_angle: f64, east_left: bool) -> String {
    let side = if east_left { "E-left" } else { "E-right" };
    format!("CCW {rotation_angle:.2} ({side})")
}

/// Parse a user-entered angle in degrees; blank input means zero.
pub fn parse_rotation_angle(input: &str) -> Result<f64, OrientationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(OrientationError::InvalidAngle(input.to_string())),
    }
}

pub struct OrientationManager {
    reference: Dataset,
    link_type: LinkType,
    frame_config: FrameConfig,
    compass_config: CompassConfig,
    layers: Vec<OrientationLayer>,
    /// `None` selects the reference image itself.
    selected: Option<String>,
    subscribers: Vec<Sender<OrientationEvent>>,
}

impl OrientationManager {
    /// Start from a reference image; linking is by WCS when it has a mapping.
    pub fn new(reference: Dataset) -> Self {
        let link_type = if reference.mapping.is_some() {
            LinkType::Wcs
        } else {
            LinkType::Pixels
        };
        Self {
            reference,
            link_type,
            frame_config: FrameConfig::default(),
            compass_config: CompassConfig::default(),
            layers: Vec::new(),
            selected: None,
            subscribers: Vec::new(),
        }
    }

    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    pub fn with_compass_config(mut self, config: CompassConfig) -> Self {
        self.compass_config = config;
        self
    }

    pub fn reference(&self) -> &Dataset {
        &self.reference
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn set_link_type(&mut self, link_type: LinkType) -> Result<(), OrientationError> {
        if link_type == LinkType::Wcs {
            self.reference.mapping()?;
        }
        self.link_type = link_type;
        Ok(())
    }

    /// Register a subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<OrientationEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, event: OrientationEvent) {
        log::debug!("orientation event: {event:?}");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Compass of the reference image.
    pub fn reference_compass(&self) -> Result<CompassGeometry, OrientationError> {
        let mapping = self.reference.mapping()?;
        Ok(compute_compass_with(mapping, self.reference.shape, &self.compass_config)?)
    }

    /// `(degn, dege, xflip)` of the reference image.
    pub fn reference_angles(&self) -> Result<(f64, f64, bool), OrientationError> {
        let g = self.reference_compass()?;
        Ok((g.degn, g.dege, g.xflip))
    }

    /// Build and register a rotated frame.
    ///
    /// An angle of zero reproduces the reference's North direction. East-left
    /// frames keep a negative x sign; East-right frames mirror it and compose
    /// the rotation with the opposite sign.
    pub fn add_orientation(
        &mut self,
        request: &OrientationRequest,
    ) -> Result<&OrientationLayer, OrientationError> {
        if self.link_type != LinkType::Wcs {
            return Err(OrientationError::NotLinkedByWcs);
        }
        let label = request
            .label
            .clone()
            .unwrap_or_else(|| default_label(request.rotation_angle, request.east_left));
        if label == self.reference.label || self.contains(&label) {
            return Err(OrientationError::DuplicateLabel(label));
        }

        let mapping = self.reference.mapping()?;
        let (degn, _, _) = self.reference_angles()?;

        // degn absorbs the reference's rotation and parity; frame signs
        // depend only on the requested handedness.
        let (theta, sign_x) = if request.east_left {
            (request.rotation_angle - degn, -1.0)
        } else {
            (degn - request.rotation_angle, 1.0)
        };
        let config = FrameConfig {
            axis_sign_flips: Some([sign_x, 1.0]),
            ..self.frame_config
        };
        let frame = synthesize_rotated_frame(
            Some(mapping),
            self.reference.shape,
            theta,
            self.reference.wcs_info.as_ref(),
            &config,
        )?;

        log::info!(
            "added orientation {label:?}: {:.2} deg {}",
            request.rotation_angle,
            if request.east_left { "E-left" } else { "E-right" }
        );
        self.layers.push(OrientationLayer {
            label: label.clone(),
            rotation_angle: request.rotation_angle,
            east_left: request.east_left,
            frame,
        });
        self.publish(OrientationEvent::Added {
            label: label.clone(),
        });
        if request.select {
            self.select(&label)?;
        }
        let index = self.layers.len() - 1;
        Ok(&self.layers[index])
    }

    /// Create (once) the North-up, East-left orientation.
    pub fn north_up_east_left(&mut self, select: bool) -> Result<&str, OrientationError> {
        self.north_up(NORTH_UP_EAST_LEFT, true, select)
    }

    /// Create (once) the North-up, East-right orientation.
    pub fn north_up_east_right(&mut self, select: bool) -> Result<&str, OrientationError> {
        self.north_up(NORTH_UP_EAST_RIGHT, false, select)
    }

    fn north_up(
        &mut self,
        label: &'static str,
        east_left: bool,
        select: bool,
    ) -> Result<&'static str, OrientationError> {
        if self.contains(label) {
            if select {
                self.select(label)?;
            }
            return Ok(label);
        }
        let (degn, _, _) = self.reference_angles()?;
        self.add_orientation(&OrientationRequest {
            rotation_angle: degn,
            east_left,
            label: Some(label.to_string()),
            select,
        })?;
        Ok(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn get(&self, label: &str) -> Option<&OrientationLayer> {
        self.layers.iter().find(|l| l.label == label)
    }

    pub fn layers(&self) -> &[OrientationLayer] {
        &self.layers
    }

    /// Labels a viewer can align to: the reference first, then each layer.
    pub fn choices(&self) -> Vec<&str> {
        std::iter::once(self.reference.label.as_str())
            .chain(self.layers.iter().map(|l| l.label.as_str()))
            .collect()
    }

    /// Labels of layers that carry real pixel values.
    pub fn flux_bearing(&self) -> Vec<&str> {
        let reference = std::iter::once(self.reference.label.as_str());
        let frames = self
            .layers
            .iter()
            .filter(|l| !l.frame.wcs_only)
            .map(|l| l.label.as_str());
        reference.chain(frames).collect()
    }

    /// Make `label` the alignment target. The reference label is accepted too.
    pub fn select(&mut self, label: &str) -> Result<(), OrientationError> {
        if label == self.reference.label {
            self.selected = None;
        } else if self.contains(label) {
            self.selected = Some(label.to_string());
        } else {
            return Err(OrientationError::UnknownLabel(label.to_string()));
        }
        self.publish(OrientationEvent::Selected {
            label: label.to_string(),
        });
        Ok(())
    }

    pub fn selected_label(&self) -> &str {
        self.selected.as_deref().unwrap_or(&self.reference.label)
    }

    /// Mapping viewers should align to.
    pub fn selected_mapping(&self) -> Option<&dyn WorldMapping> {
        match &self.selected {
            Some(label) => self.get(label).map(|l| &l.frame as &dyn WorldMapping),
            None => self.reference.mapping().ok(),
        }
    }

    /// Drop an orientation layer; if it was selected, fall back to the reference.
    pub fn remove(&mut self, label: &str) -> Result<OrientationLayer, OrientationError> {
        if label == self.reference.label {
            return Err(OrientationError::ReferenceLayer(label.to_string()));
        }
        let index = self
            .layers
            .iter()
            .position(|l| l.label == label)
            .ok_or_else(|| OrientationError::UnknownLabel(label.to_string()))?;
        let layer = self.layers.remove(index);
        self.publish(OrientationEvent::Removed {
            label: label.to_string(),
        });
        if self.selected.as_deref() == Some(label) {
            let reference = self.reference.label.clone();
            self.select(&reference)?;
        }
        Ok(layer)
    }
}
