use plotters::prelude::*;
use vehicle::{PacejkaTyre, VehicleConfig};

fn draw_curves(
    filename: &str,
    title: &str,
    x: &[f64],
    curves: &[(String, Vec<f64>, RGBColor)],
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let x_max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let y_max = curves
        .iter()
        .flat_map(|(_, y, _)| y.iter().map(|v| v.abs()))
        .fold(0.0, f64::max);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("Arial", 28))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, -1.1 * y_max..1.1 * y_max)?;

    chart
        .configure_mesh()
        .x_desc("Slip Angle [deg]")
        .y_desc("Lateral Force Fy [N]")
        .draw()?;

    for (label, y, color) in curves {
        let color = *color;
        chart
            .draw_series(LineSeries::new(
                x.iter().cloned().zip(y.iter().cloned()),
                &color,
            ))?
            .label(label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.filled()));
    }

    chart.configure_series_labels().border_style(&BLACK).draw()?;

    root.present()?;
    Ok(())
}

fn sweep(tyre: &PacejkaTyre, mu: f64, loads: &[f64], alphas: &[f64]) -> Vec<(String, Vec<f64>, RGBColor)> {
    let colors = [BLUE, RED, GREEN, MAGENTA];
    loads
        .iter()
        .zip(colors.iter().cycle())
        .map(|(&fz, &color)| {
            let fy = alphas
                .iter()
                .map(|a| tyre.lateral_force(a.to_radians(), fz, mu))
                .collect();
            (format!("Fz = {fz:.0} N"), fy, color)
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = VehicleConfig::default();
    let mu = config.friction_coefficient;
    let loads = [1000.0, 2000.0, 3000.0, 4000.0];

    // Sweep from -15 deg to +15 deg
    let alphas: Vec<f64> = (-150..=150).map(|d| d as f64 * 0.1).collect();

    draw_curves(
        "front_tyre_lateral_force.png",
        "Front Tyre Lateral Force vs Slip Angle",
        &alphas,
        &sweep(&config.front_tyre, mu, &loads, &alphas),
    )?;
    draw_curves(
        "rear_tyre_lateral_force.png",
        "Rear Tyre Lateral Force vs Slip Angle",
        &alphas,
        &sweep(&config.rear_tyre, mu, &loads, &alphas),
    )?;

    println!("Wrote plots: front_tyre_lateral_force.png, rear_tyre_lateral_force.png");
    Ok(())
}
