//! Low-rank factorization of partially observed matrices.
//!
//! An original matrix, typically users by items with most entries unknown,
//! is approximated by the product of a row-factor and a column-factor matrix
//! learned with coordinate-wise gradient descent. Unknown entries are NaN and
//! are skipped by every error and gradient computation.
//!
//! ```rust
//! use factorizer::matrix::{Matrix, ValueSet};
//! use factorizer::model::Factorization;
//!
//! let ratings = Matrix::empty(2, 2)
//!     .with_values(&[
//!         ValueSet::new(5.0, 0, 0),
//!         ValueSet::new(1.0, 0, 1),
//!         ValueSet::new(4.0, 1, 0),
//!         ValueSet::new(2.0, 1, 1),
//!     ])
//!     .unwrap();
//!
//! let mut factorization = Factorization::new(ratings, 2, 0.01, 100).unwrap();
//! factorization.train().unwrap();
//! assert!(factorization.mean_squared_error().unwrap().is_finite());
//! ```

pub mod config;
pub mod csv_plot;
pub mod data_loader;
pub mod error;
pub mod gradient;
pub mod matrix;
pub mod model;
pub mod training_logs;

pub use error::{FactorizationError, LoadError};
pub use matrix::Matrix;
pub use model::Factorization;
