macro_rules! grow_capacity {
    ($capacity:expr) => {{
        if $capacity < 8 {
            8
        } else {
            $capacity * 2
        }
    }};
}

pub(crate) use grow_capacity;
