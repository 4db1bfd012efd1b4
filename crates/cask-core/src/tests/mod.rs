mod backup;
mod check;
mod helpers;
mod sync;
