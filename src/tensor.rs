/// Dense f32 tensor in height x width x channels order.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.iter().product()],
        }
    }

    /// Returns `None` when `data` does not hold exactly `shape` elements.
    pub fn from_vec(shape: [usize; 3], data: Vec<f32>) -> Option<Self> {
        if data.len() != shape.iter().product::<usize>() {
            return None;
        }
        Some(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape[0]
    }

    pub fn width(&self) -> usize {
        self.shape[1]
    }

    pub fn channels(&self) -> usize {
        self.shape[2]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn get(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[(y * self.shape[1] + x) * self.shape[2] + c]
    }
}
