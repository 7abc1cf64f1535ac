// Copyright 2022 The phrenorm Developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use phrenorm_mesh::{MeshShift, QPoint};
use phrenorm_response::{
    occupations::Smearing, parallel::SerialCommunicator, polarization::Polarization,
    self_energy::PhononSelfEnergy, ResponseSettings,
};
use utilities::{random_dispersion, random_squared_coupling, random_transform};

pub fn bench_polarization(c: &mut Criterion) {
    let settings = ResponseSettings::new(0.05, Smearing::FermiDirac);
    let nbnd = 3;

    let mut group = c.benchmark_group("polarization");
    for nk in [12, 24, 48].into_iter() {
        let energies = random_dispersion(nk, nbnd, 1);
        let transform = random_transform(nk, nbnd, 2);
        let polarization =
            Polarization::new(energies.view(), transform.view(), &settings, None).unwrap();
        let shift = MeshShift::new(1, 2, nk);
        group.bench_with_input(BenchmarkId::from_parameter(nk), &nk, |b, _| {
            b.iter(|| polarization.evaluate_shift(black_box(shift)))
        });
    }
    group.finish();
}

pub fn bench_phonon_self_energy(c: &mut Criterion) {
    let settings = ResponseSettings::new(0.05, Smearing::Gauss);
    let self_energy = PhononSelfEnergy::new(settings);
    let nbnd = 2;
    let q = [QPoint::new(0.3, 1.1)];

    let mut group = c.benchmark_group("phonon_self_energy");
    for nk in [12, 24, 48].into_iter() {
        let energies = random_dispersion(nk, nbnd, 3);
        let g2 = random_squared_coupling(q.len(), 3, nk, nbnd, 4);
        group.bench_with_input(BenchmarkId::from_parameter(nk), &nk, |b, _| {
            b.iter(|| {
                self_energy
                    .calculate(
                        &SerialCommunicator,
                        black_box(&q),
                        energies.view(),
                        Some(g2.view()),
                    )
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_polarization, bench_phonon_self_energy);
criterion_main!(benches);
