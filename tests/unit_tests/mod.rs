mod geometry;
mod operators;
mod reorder;
