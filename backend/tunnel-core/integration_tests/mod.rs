mod control;
mod exchange;
mod helpers;
mod lifecycle;
