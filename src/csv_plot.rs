use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use plotters::prelude::*;

use crate::error::{FactorizationError, Result};

/// Reads the `epoch,error` rows written by `CsvTrainingLog`.
pub fn read_error_log<P: AsRef<Path>>(filename: P) -> Result<Vec<(usize, f64)>> {
    let file = File::open(filename.as_ref()).map_err(FactorizationError::telemetry)?;
    let reader = BufReader::new(file);

    let mut data = Vec::new();
    for line in reader.lines().skip(1) {
        let line = line.map_err(FactorizationError::telemetry)?;
        let mut values = line.split(',');
        let (Some(epoch), Some(error)) = (values.next(), values.next()) else {
            continue;
        };
        let epoch = epoch.trim().parse::<usize>().map_err(FactorizationError::telemetry)?;
        let error = error.trim().parse::<f64>().map_err(FactorizationError::telemetry)?;
        data.push((epoch, error));
    }
    Ok(data)
}

// plot the checkpoint error curve
pub fn plot_error_curve<P: AsRef<Path>>(history: &[(usize, f64)], location: P) -> Result<()> {
    let finite: Vec<(usize, f64)> = history.iter().copied().filter(|(_, error)| error.is_finite()).collect();
    let (Some(first), Some(last)) = (finite.first(), finite.last()) else {
        return Err(FactorizationError::telemetry("no finite errors to plot"));
    };
    let max_error = finite.iter().map(|&(_, error)| error).fold(0.0, f64::max);

    let root = BitMapBackend::new(location.as_ref(), (1024, 768)).into_drawing_area();
    root.fill(&WHITE).map_err(FactorizationError::telemetry)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Squared Error Over Training", ("sans-serif", 40))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(first.0..last.0.max(first.0 + 1), 0f64..max_error.max(f64::EPSILON))
        .map_err(FactorizationError::telemetry)?;

    chart
        .configure_mesh()
        .x_desc("epoch")
        .y_desc("error")
        .draw()
        .map_err(FactorizationError::telemetry)?;

    chart
        .draw_series(LineSeries::new(finite.iter().copied(), &BLUE))
        .map_err(FactorizationError::telemetry)?
        .label("Error")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .draw()
        .map_err(FactorizationError::telemetry)?;

    root.present().map_err(FactorizationError::telemetry)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_log_written_by_training() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "epoch,error\n0,12.5\n10,3.25\n").unwrap();
        let data = read_error_log(file.path()).unwrap();
        assert_eq!(data, vec![(0, 12.5), (10, 3.25)]);
    }

    #[test]
    fn empty_history_is_not_plotted() {
        let dir = tempfile::tempdir().unwrap();
        let err = plot_error_curve(&[], dir.path().join("curve.png")).unwrap_err();
        assert!(matches!(err, FactorizationError::Telemetry { .. }));
        assert!(plot_error_curve(&[(0, f64::NAN)], dir.path().join("curve.png")).is_err());
    }
}
