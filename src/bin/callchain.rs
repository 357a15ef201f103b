// callchain: main → a → b → c → d, then spins forever without output.
//
// Process arguments are ignored. The exit code below is never reached.

use std::process::ExitCode;

use callprobe::fixture::{self, Unbounded};

fn main() -> ExitCode {
    let x = fixture::X;
    let y = fixture::Y;
    let z = fixture::Z;
    fixture::a(x, y, z, &mut Unbounded);
    ExitCode::SUCCESS
}
