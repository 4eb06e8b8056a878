use crate::error::{Error, Result};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::FromRepr)]
#[repr(i32)]
pub enum PointLabel {
    Negative = 0, // background
    Positive = 1, // foreground
}

/// A single hint in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prompt {
    Point([f32; 2], PointLabel),
    Box([f32; 4]), // left-top x, left-top y, right-bottom x, right-bottom y
}

impl Prompt {
    pub fn new_point(x: f32, y: f32, label: PointLabel) -> Self {
        Self::Point([x, y], label)
    }

    // corners may arrive in any order
    pub fn new_box(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::Box([x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)])
    }
}

// SAM decoder encoding: box corners are labelled 2 and 3
impl From<Prompt> for (Vec<f32>, Vec<f32>) {
    fn from(prompt: Prompt) -> Self {
        match prompt {
            Prompt::Point(point, label) => (vec![point[0], point[1]], vec![label as i32 as f32]),
            Prompt::Box(bb) => {
                let [x1, y1, x2, y2] = bb;

                (vec![x1, y1, x2, y2], vec![2.0, 3.0])
            }
        }
    }
}

/// Prompt as received from a client, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptSpec {
    #[serde(default)]
    pub points: Option<Vec<[f32; 2]>>,
    #[serde(default)]
    pub point_labels: Option<Vec<i32>>,
    #[serde(default, rename = "box")]
    pub bbox: Option<Vec<f32>>,
    #[serde(default = "default_multimask")]
    pub multimask: bool,
}

fn default_multimask() -> bool {
    true
}

impl Default for PromptSpec {
    fn default() -> Self {
        PromptSpec {
            points: None,
            point_labels: None,
            bbox: None,
            multimask: default_multimask(),
        }
    }
}

impl PromptSpec {
    pub fn with_points(mut self, points: Vec<[f32; 2]>) -> Self {
        self.points = Some(points);
        self
    }

    pub fn with_labels(mut self, labels: Vec<i32>) -> Self {
        self.point_labels = Some(labels);
        self
    }

    pub fn with_box(mut self, bbox: Vec<f32>) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_multimask(mut self, multimask: bool) -> Self {
        self.multimask = multimask;
        self
    }

    /// Normalizes the request into point prompts followed by at most one box prompt.
    ///
    /// Empty point or box lists count as absent. Labels are used only when there is one per
    /// point, otherwise every point is a foreground hint.
    pub fn prompts(&self) -> Result<Vec<Prompt>> {
        let mut prompts = Vec::new();

        let points = self.points.as_deref().unwrap_or_default();
        let labels = match self.point_labels.as_deref() {
            Some(labels) if labels.len() == points.len() => labels
                .iter()
                .map(|&l| {
                    PointLabel::from_repr(l).ok_or_else(|| {
                        Error::InvalidPrompt(format!("point label must be 0 or 1, got {l}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            _ => vec![PointLabel::Positive; points.len()],
        };

        for (&[x, y], label) in points.iter().zip(labels) {
            if !x.is_finite() || !y.is_finite() {
                return Err(Error::InvalidPrompt("point coordinates must be finite".to_string()));
            }
            prompts.push(Prompt::new_point(x, y, label));
        }

        match self.bbox.as_deref() {
            None | Some([]) => {}
            Some(&[x1, y1, x2, y2]) => {
                if [x1, y1, x2, y2].iter().any(|v| !v.is_finite()) {
                    return Err(Error::InvalidPrompt("box coordinates must be finite".to_string()));
                }
                prompts.push(Prompt::new_box(x1, y1, x2, y2));
            }
            Some(_) => return Err(Error::InvalidPrompt("box must be [x1,y1,x2,y2]".to_string())),
        }

        Ok(prompts)
    }
}
