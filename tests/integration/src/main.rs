mod helpers;

mod bootstrap;
mod encryption;
mod scale;
mod upgrade;

fn main() {}
