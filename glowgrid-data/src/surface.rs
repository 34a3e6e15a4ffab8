use crate::Cell;

/// A row-major 2D grid of [`Cell`]s.
///
/// Surfaces are owned by the caller; the renderer only ever borrows one
/// for the duration of a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl Surface {
    /// Creates a surface filled with the default (blank) cell.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        debug_assert!(width > 0, "width: {width}");
        debug_assert!(height > 0, "height: {height}");

        let len = (width.max(0) as usize) * (height.max(0) as usize);
        Self {
            width,
            height,
            cells: vec![Cell::default(); len],
        }
    }

    /// Width in cells.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Height in cells.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Returns the cell at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> Option<&Cell> {
        self.index_of(x, y).map(|idx| &self.cells[idx])
    }

    /// Returns a mutable reference to the cell at `(x, y)`.
    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut Cell> {
        self.index_of(x, y).map(move |idx| &mut self.cells[idx])
    }

    /// Overwrites the cell at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn put(&mut self, x: i32, y: i32, cell: Cell) {
        if let Some(slot) = self.get_mut(x, y) {
            *slot = cell;
        }
    }

    /// Fills the whole surface with `cell`.
    pub fn fill(&mut self, cell: Cell) {
        self.cells.fill(cell);
    }

    /// All cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Mutable access to all cells in row-major order.
    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }
}
