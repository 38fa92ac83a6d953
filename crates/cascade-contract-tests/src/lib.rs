#![forbid(unsafe_code)]


#[cfg(test)]
mod end_to_end;
#[cfg(test)]
mod frame_sync;
#[cfg(test)]
mod lifecycle;
