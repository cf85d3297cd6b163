use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::args::SimConfig;
use crate::backend::{PoolShim, SimError, StepOutcome};
use crate::logging::EventLog;
use crate::model::{Op, TaskState};
use crate::oracle::Oracle;
use crate::scheduler::Scheduler;

pub(crate) fn run(config: SimConfig, rng: &mut ChaCha8Rng) -> Result<(), String> {
    let mut shim = PoolShim::new(&config)?;
    let mut tasks: Vec<TaskState> = (0..config.tasks).map(TaskState::new).collect();
    let mut scheduler = Scheduler::new(config.tasks);
    let mut events = EventLog::new(config.first_steps, config.tail_steps);

    let max_steps = config.iterations.unwrap_or(u64::MAX);
    let max_time = config.duration_ms.unwrap_or(u64::MAX);

    let mut step: u64 = 0;
    let mut exhausted: u64 = 0;
    let mut create_failures: u64 = 0;
    while step < max_steps && scheduler.clock.now_ms <= max_time {
        let Some(task_id) = scheduler.next_ready(rng) else {
            let reason = format!(
                "no runnable task: {} parked, pool {:?}",
                scheduler.parked_len(),
                shim.pool.status()
            );
            events.dump_failure(&reason);
            return Err(reason);
        };
        let op = next_op(&tasks[task_id], shim.backend_down(), &config, rng);
        let outcome = match shim.apply(&mut tasks[task_id], op) {
            Ok(outcome) => outcome,
            Err(reason) => {
                events.dump_failure(&reason);
                return Err(reason);
            }
        };

        match (op, &outcome.result) {
            (Op::Sleep(ms), _) => scheduler.sleep(task_id, ms),
            (_, Err(SimError::Exhausted)) => {
                exhausted += 1;
                scheduler.park(task_id);
            }
            (_, Err(SimError::CreateFailed)) => {
                create_failures += 1;
                scheduler.sleep(task_id, rng.random_range(1..=20));
            }
            (Op::Release | Op::Drop, Ok(())) => {
                scheduler.unpark_all();
                scheduler.mark_ready(task_id);
            }
            _ => scheduler.mark_ready(task_id),
        }
        events.record(format_step(step, scheduler.clock.now_ms, task_id, op, &outcome));

        if let Err(reason) = Oracle::check(&tasks, &shim.pool, &shim.factory) {
            events.dump_failure(&reason);
            return Err(reason);
        }
        scheduler.advance_time(1);
        step += 1;
    }

    let still_alive = shim.finish(&mut tasks)?;
    if still_alive > 0 {
        let reason = format!("{still_alive} handles never destroyed after shutdown");
        events.dump_failure(&reason);
        return Err(reason);
    }

    let status = shim.pool.status();
    tracing::info!(
        "complete: steps={} time={}ms tasks={} max_total={} created={} destroyed={} validation_failures={} exhausted={} create_failures={}",
        step,
        scheduler.clock.now_ms,
        config.tasks,
        config.max_total,
        status.created,
        status.destroyed,
        status.validation_failures,
        exhausted,
        create_failures
    );
    Ok(())
}

fn next_op(task: &TaskState, backend_down: bool, config: &SimConfig, rng: &mut ChaCha8Rng) -> Op {
    if rng.random::<f64>() < config.sleep_rate {
        return Op::Sleep(rng.random_range(1..=50));
    }
    if rng.random::<f64>() < config.create_fail_rate {
        return if backend_down { Op::Recover } else { Op::Outage };
    }

    if task.held.is_none() {
        return Op::Borrow;
    }

    let weights = [
        (Op::Use, 0.55),
        (Op::Release, 0.30),
        (Op::Drop, config.drop_rate),
        (Op::Invalidate, config.invalidate_rate),
    ];
    choose_weighted(&weights, rng)
}

fn choose_weighted(items: &[(Op, f64)], rng: &mut ChaCha8Rng) -> Op {
    let total: f64 = items.iter().map(|(_, weight)| weight.max(0.0)).sum();
    if total <= f64::EPSILON {
        return items.first().map_or(Op::Sleep(1), |(op, _)| *op);
    }
    let mut target = rng.random::<f64>() * total;
    for (op, weight) in items {
        let w = weight.max(0.0);
        if target <= w {
            return *op;
        }
        target -= w;
    }
    items.last().map_or(Op::Sleep(1), |(op, _)| *op)
}

fn format_step(step: u64, now_ms: u64, task: usize, op: Op, outcome: &StepOutcome) -> String {
    let op_label = match op {
        Op::Sleep(ms) => format!("Sleep({ms}ms)"),
        other => format!("{other:?}"),
    };
    let result_label = match outcome.result {
        Ok(()) => "Ok".to_string(),
        Err(err) => format!("Err({err:?})"),
    };
    let slot_label = outcome
        .slot
        .map_or_else(|| "-".to_string(), |slot| slot.to_string());
    format!("step={step} time={now_ms}ms task={task} op={op_label} slot={slot_label} result={result_label}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rand::SeedableRng;

    use crate::args::Args;

    #[test]
    fn quick_preset_runs_clean() {
        for seed in 0..3 {
            let seed = seed.to_string();
            let args = Args::parse_from(["simulator", "--quick", "--iterations", "2000", "--seed", &seed]);
            let mut config = SimConfig::from_args(args);
            config.iterations = Some(2_000);
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
            run(config, &mut rng).unwrap();
        }
    }

    #[test]
    fn small_pool_many_tasks_runs_clean() {
        let args = Args::parse_from([
            "simulator",
            "--seed",
            "99",
            "--iterations",
            "3000",
            "--tasks",
            "12",
            "--max-total",
            "3",
            "--max-idle",
            "1",
            "--test-on-borrow",
            "--drop-rate",
            "0.2",
        ]);
        let config = SimConfig::from_args(args);
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        run(config, &mut rng).unwrap();
    }
}
