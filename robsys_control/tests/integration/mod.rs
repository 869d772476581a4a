mod cycle;
mod hot_swap;
mod network;
