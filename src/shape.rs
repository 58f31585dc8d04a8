use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::StoreError;

/// The closed set of shapes a drawing can be labelled with.
///
/// `ALL` is the order in which the dataset builder walks the buckets,
/// so it also fixes the block order of the consolidated arrays.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Shape
{
    X,
    O,
    Square,
    Triangle,
}

impl Shape
{
    pub const ALL: [Shape; 4] = [Shape::X, Shape::O, Shape::Square, Shape::Triangle];

    /// The label value written into the label vector.
    pub fn symbol(&self) -> char
    {
        match self
        {
            Shape::X => 'X',
            Shape::O => 'O',
            Shape::Square => '■',
            Shape::Triangle => '▲',
        }
    }

    /// Default bucket directory name, relative to the data directory.
    pub fn dir_name(&self) -> &'static str
    {
        match self
        {
            Shape::X => "X",
            Shape::O => "O",
            Shape::Square => "cuadrado",
            Shape::Triangle => "triangulo",
        }
    }

    fn variant_name(&self) -> &'static str
    {
        match self
        {
            Shape::X => "x",
            Shape::O => "o",
            Shape::Square => "square",
            Shape::Triangle => "triangle",
        }
    }
}

impl Display for Shape
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Shape
{
    type Err = StoreError;

    /// Accepts the symbol the drawing page posts, and for scripted clients
    /// the variant or bucket name in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let trimmed = s.trim();
        Shape::ALL
            .into_iter()
            .find(|shape| {
                trimmed.chars().eq(std::iter::once(shape.symbol()))
                    || trimmed.eq_ignore_ascii_case(shape.variant_name())
                    || trimmed.eq_ignore_ascii_case(shape.dir_name())
            })
            .ok_or_else(|| StoreError::UnknownLabel(s.to_string()))
    }
}
