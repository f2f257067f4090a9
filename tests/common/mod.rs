use reliability::config::Config;
use reliability::delay_model::ConstantDistributions;
use reliability::distribution_store::Store;
use reliability::precomputation::perform_precomputation;
use reliability::timetable::{Timetable, TimetableBuilder};

pub const A: usize = 0;
pub const B: usize = 1;
pub const C: usize = 2;
pub const D: usize = 3;
pub const E: usize = 4;
pub const F: usize = 5;
pub const G: usize = 6;

pub const ICE_A_B: usize = 0;
pub const ICE_B_C: usize = 1;
pub const ICE_C_D: usize = 2;
pub const RE_E_B: usize = 3;
pub const RE_B_F: usize = 4;
pub const BUS_B_G: usize = 5;

/// Three hourly ICE trips A-B-C-D (trains 100..) fed at B by RE trips E-B-F (trains 200..)
/// and a bus B-G (trains 300..) that nobody waits for.
pub fn corridor() -> Timetable {
    let mut b = TimetableBuilder::new();
    for (id, transfer) in [("A", 2), ("B", 4), ("C", 3), ("D", 2), ("E", 2), ("F", 2), ("G", 2)] {
        b.add_station(&id.to_lowercase(), id, transfer);
    }
    b.add_waiting_time("RE", "ICE", 3);
    b.add_waiting_time("ICE", "RE", 5);
    let ice = b.add_route("ice", "ICE", "ICE", &[A, B, C, D]).unwrap();
    let re = b.add_route("re", "RE 1", "RE", &[E, B, F]).unwrap();
    let bus = b.add_route("bus", "Bus 9", "Bus", &[B, G]).unwrap();
    for k in 0..3 {
        let base = 60 * k;
        b.add_trip(ice, 100 + k as u32, "", &[(0, base), (base + 30, base + 32), (base + 60, base + 61), (base + 90, base + 90)])
            .unwrap();
        b.add_trip(re, 200 + k as u32, "1", &[(0, base + 10), (base + 26, base + 28), (base + 50, base + 50)])
            .unwrap();
        b.add_trip(bus, 300 + k as u32, "9", &[(0, base + 40), (base + 55, base + 55)])
            .unwrap();
    }
    b.build()
}

pub fn precomputed() -> (Timetable, Store, ConstantDistributions, Config) {
    let tt = corridor();
    let s_t = ConstantDistributions::default();
    let config = Config::default();
    let mut store = Store::new();
    perform_precomputation(&tt, &s_t, &config, &mut store);
    (tt, store, s_t, config)
}
