use anyhow::{anyhow, Result};

/// Fixed parameters of a single run.
///
/// The values are handed to [`Distributor`](crate::Distributor) once and never
/// change while the simulation is going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Params {
    /// Number of rows of the field.
    pub image_height: usize,
    /// Number of columns of the field.
    pub image_width: usize,
    /// How many generations to compute before quitting on its own.
    pub turns: u32,
    /// Number of row partitions (and worker tasks) per generation.
    pub threads: usize,
}

impl Params {
    /// Rejects configurations that cannot be tiled into partitions.
    ///
    /// `turns == 0` is allowed: the run reports the initial field and quits.
    pub fn validate(&self) -> Result<()> {
        if self.image_height == 0 || self.image_width == 0 {
            return Err(anyhow!(
                "Field must not be empty, got {}x{}",
                self.image_height,
                self.image_width
            ));
        }
        if self.threads == 0 {
            return Err(anyhow!("At least one worker thread is required"));
        }
        if self.image_height.checked_mul(self.image_width).is_none() {
            return Err(anyhow!(
                "Field {}x{} is too large",
                self.image_height,
                self.image_width
            ));
        }
        Ok(())
    }

    /// Name of the initial image, `"{height}x{width}"`.
    pub fn input_name(&self) -> String {
        format!("{}x{}", self.image_height, self.image_width)
    }

    /// Name of a snapshot taken after `turn` generations, `"{height}x{width}x{turn}"`.
    pub fn output_name(&self, turn: u32) -> String {
        format!("{}x{}x{}", self.image_height, self.image_width, turn)
    }
}
